//! UV Callback Tree
//!
//! Reconstruction and querying of callback trees from instrumented
//! libuv event-loop traces.
//!
//! A trace holds one record per line, each describing a callback invocation
//! and the callback that registered it. This crate parses those records,
//! links them into a validated tree, and answers the structural and temporal
//! questions schedule analysis needs: execution and registration order,
//! ancestry, descendants, traversal and pruning.
//!
//! ## Getting Started
//!
//! ```ignore
//! use uv_callback_tree::CallbackTraceTree;
//!
//! let tree = CallbackTraceTree::from_path("callbacks.log")?;
//! for id in tree.execution_order() {
//!     println!("{}", tree.record(id).name);
//! }
//! ```

pub mod output;
pub mod parser;
pub mod tree;
pub mod utils;

pub use parser::{parse_record, CallbackRecord, CallbackType};
pub use tree::{CallbackTraceTree, NodeId, TraceNode};
pub use utils::error::{LoadError, OutputError, RecordError, ScheduleError, TreeError};
