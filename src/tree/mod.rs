//! Reconstruction of the callback tree from parsed records.
//!
//! This module turns a flat trace into:
//! - A validated parent/child hierarchy (one root, fully connected)
//! - Resolved dependency links between callbacks
//! - Execution/registration orderings, ancestry queries and traversal
//! - Pruning of callbacks that match a predicate
//! - Loop-stage annotation and validation of the executed schedule
//! - Summary metrics

pub mod callback_tree;
pub mod metrics;
mod prune;
mod query;
pub mod schedule;

// Re-export main types and functions
pub use callback_tree::{CallbackTraceTree, NodeId, TraceNode};
pub use metrics::{calculate_metrics, summarize};
pub use schedule::{annotate_schedule, validate_schedule, ScheduleEvent, ScheduleStage};
