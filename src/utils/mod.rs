//! Utility modules for configuration, error handling, and diagnostics.

pub mod config;
pub mod error;
pub mod observer;

// Re-export commonly used error types for convenience
pub use error::{LoadError, OutputError, RecordError, ScheduleError, TreeError};
pub use observer::{LogObserver, TraceEvent, TraceObserver};
