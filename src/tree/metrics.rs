//! Summary statistics over a callback tree.
//!
//! These feed the JSON summary and give a quick picture of a trace:
//! how much of it ran, how much is application code, and how deep the
//! registration chains go.

use super::callback_tree::CallbackTraceTree;
use crate::parser::schema::{TreeMetrics, TreeSummary};
use crate::utils::config::SCHEMA_VERSION;
use log::debug;

/// Calculate metrics over the retained nodes of a tree
///
/// **Public** - main entry point for metrics calculation
pub fn calculate_metrics(tree: &CallbackTraceTree) -> TreeMetrics {
    debug!("Calculating metrics over {} nodes", tree.len());

    let mut metrics = TreeMetrics::default();
    let root_level = tree.record(tree.root()).tree_level;
    let mut earliest_start: Option<u64> = None;
    let mut latest_end: Option<u64> = None;

    for (_, node) in tree.iter() {
        let record = node.record();
        metrics.total_nodes += 1;
        *metrics.by_type.entry(record.cb_type.to_string()).or_insert(0) += 1;
        metrics.max_depth = metrics.max_depth.max(record.tree_level - root_level);

        if record.is_user_code() {
            metrics.user_nodes += 1;
        }
        if record.is_marker() {
            metrics.marker_nodes += 1;
        }
        if record.is_threadpool() {
            metrics.threadpool_nodes += 1;
        }

        if !record.executed() {
            continue;
        }
        metrics.executed_nodes += 1;
        earliest_start = Some(earliest_start.map_or(record.start_time, |t| t.min(record.start_time)));
        latest_end = Some(latest_end.map_or(record.end_time, |t| t.max(record.end_time)));

        if !record.is_marker() {
            metrics.total_callback_ns += record.duration_ns().unwrap_or(0);
        }
    }

    if let (Some(start), Some(end)) = (earliest_start, latest_end) {
        metrics.execution_span_ns = end.saturating_sub(start);
    }

    metrics
}

/// Build the JSON summary for a tree
///
/// **Public** - used by callers that persist summaries
///
/// # Arguments
/// * `tree` - Tree to summarize
/// * `source` - Label for where the tree came from (usually the trace path)
pub fn summarize(tree: &CallbackTraceTree, source: &str) -> TreeSummary {
    use chrono::Utc;

    TreeSummary {
        version: SCHEMA_VERSION.to_string(),
        source: source.to_string(),
        root: tree.record(tree.root()).name.clone(),
        metrics: calculate_metrics(tree),
        generated_at: Utc::now().to_rfc3339(),
    }
}
