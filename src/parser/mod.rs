//! Trace record parsing and schema definitions.
//!
//! This module handles:
//! - Parsing one trace line into a typed callback record
//! - Classifying callback types and loop-stage markers
//! - Writing records back to the trace line format
//! - Defining the summary output schema

pub mod callback_type;
pub mod record;
pub mod schema;

// Re-export main types
pub use callback_type::{CallbackBehavior, CallbackType, LoopStage, MarkerBoundary};
pub use record::{format_time_ns, parse_record, parse_time_ns, CallbackRecord};
pub use schema::{TreeMetrics, TreeSummary};
