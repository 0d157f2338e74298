//! Output JSON schema definitions for tree summaries.
//!
//! This module defines the structure of JSON files we write to disk.
//! Schema is versioned to allow future evolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level summary structure written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// Trace file (or other label) the tree was loaded from
    pub source: String,

    /// Name of the root callback
    pub root: String,

    /// Statistics over the retained nodes
    pub metrics: TreeMetrics,

    /// Timestamp when the summary was generated
    pub generated_at: String,
}

/// Statistics over a callback tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetrics {
    /// Number of nodes in the tree
    pub total_nodes: usize,

    /// Nodes that were executed (active or finished)
    pub executed_nodes: usize,

    /// Nodes that are genuine application callbacks
    pub user_nodes: usize,

    /// Synthetic loop-stage markers
    pub marker_nodes: usize,

    /// Callbacks run on the threadpool
    pub threadpool_nodes: usize,

    /// Node count per callback type
    pub by_type: BTreeMap<String, usize>,

    /// Deepest level below the root (root = 0)
    pub max_depth: i64,

    /// Earliest start to latest end over executed nodes, in nanoseconds
    pub execution_span_ns: u64,

    /// Summed run time of executed non-marker callbacks, in nanoseconds
    pub total_callback_ns: u64,
}
