//! Configuration and constants for trace parsing.

/// Current summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Separator between `<key> <value>` segments of a record line
pub const FIELD_DELIMITER: char = '|';

/// Separator used when writing a record back out
pub const SERIALIZED_DELIMITER: &str = " | ";

// 1 second = 1,000,000,000 nanoseconds
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Keys every record line must carry, in canonical output order
pub const REQUIRED_KEYS: &[&str] = &[
    "name",
    "context",
    "context_type",
    "cb_type",
    "cb_behavior",
    "tree_number",
    "tree_level",
    "level_entry",
    "exec_id",
    "reg_id",
    "callback_info",
    "registrar",
    "tree_parent",
    "registration_time",
    "start_time",
    "end_time",
    "executing_thread",
    "active",
    "finished",
    "extra_info",
    "dependencies",
];

/// Keys the instrumented runtime may emit that we accept but do not require
pub const OPTIONAL_KEYS: &[&str] = &["cb"];

/// Callback types carrying this prefix are synthetic loop-stage markers
pub const MARKER_PREFIX: &str = "MARKER_";

/// Tag in `extra_info` identifying internal callbacks that look like user code
pub const NON_USER_TAG: &str = "non-user";

/// Callback types that can be moved between loop iterations
pub const ASYNC_CB_TYPES: &[&str] = &["UV_TIMER_CB"];
