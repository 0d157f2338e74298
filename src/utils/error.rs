//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with custom types.
//! Every variant carries enough context (key, name, id) to find the bad record.

use crate::parser::LoopStage;
use thiserror::Error;

/// Errors that can occur while parsing a single record line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Empty record line")]
    EmptyLine,

    #[error("Record line is not valid UTF-8 (first bad byte at offset {offset})")]
    InvalidUtf8 { offset: usize },

    #[error("Malformed segment '{0}': expected '<key> <value>'")]
    MalformedSegment(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid integer for {field}: '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("Malformed time for {field}: '{value}' (expected '<N>s <M>ns')")]
    MalformedTime { field: &'static str, value: String },

    #[error("Time overflow for {field}: '{value}'")]
    TimeOverflow { field: &'static str, value: String },

    #[error("Time goes backwards in {name}: {earlier_field} {earlier}ns > {later_field} {later}ns")]
    NonMonotonicTime {
        name: String,
        earlier_field: &'static str,
        earlier: u64,
        later_field: &'static str,
        later: u64,
    },
}

/// Errors that can occur while linking or querying a callback tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    #[error("Multiple roots: {first} and {second} both have no resolvable registrar")]
    MultipleRoots { first: String, second: String },

    #[error("No root: every node names a registrar in the trace")]
    NoRoot,

    #[error("Disconnected node: {0} does not reach the root")]
    Disconnected(String),

    #[error("Tree number mismatch: child {child} ({child_tree}) vs parent {parent} ({parent_tree})")]
    TreeNumberMismatch {
        child: String,
        child_tree: i64,
        parent: String,
        parent_tree: i64,
    },

    #[error("Tree level mismatch: child {child} at level {child_level} under parent {parent} at level {parent_level}")]
    LevelMismatch {
        child: String,
        child_level: i64,
        parent: String,
        parent_level: i64,
    },

    #[error("Unresolved dependency: {name} depends on unknown node {dependency}")]
    UnresolvedDependency { name: String, dependency: String },

    #[error("Node {name} (exec_id {exec_id}) has no predecessor in the tree's execution order")]
    NotInExecutionOrder { name: String, exec_id: i64 },
}

/// Errors that can occur while loading a trace
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: RecordError,
    },

    #[error("Invalid trace structure: {0}")]
    Structure(#[from] TreeError),
}

/// Ways an executed schedule can fail to look like a legal libuv run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Execution ids must count up from 0: {name} at position {position} has exec_id {exec_id}")]
    ExecIdGap {
        name: String,
        position: usize,
        exec_id: i64,
    },

    #[error("INITIAL_STACK must run first, but {name} runs at position {position}")]
    InitialStackNotFirst { name: String, position: usize },

    #[error("Looper callback {name} ran after EXIT")]
    EventAfterExit { name: String },

    #[error("Marker {name} has no known loop stage: {cb_type}")]
    UnknownMarker { name: String, cb_type: String },

    #[error("{name} begins {stage:?} while {open:?} is still open")]
    StageNotEnded {
        name: String,
        stage: LoopStage,
        open: LoopStage,
    },

    #[error("{name} begins {stage:?} but the next stage must be {expected:?}")]
    UnexpectedStage {
        name: String,
        stage: LoopStage,
        expected: LoopStage,
    },

    #[error("{name} ends {stage:?} but no stage is open")]
    EndWithoutBegin { name: String, stage: LoopStage },

    #[error("{name} ends {stage:?} but the open stage is {open:?}")]
    MismatchedEnd {
        name: String,
        stage: LoopStage,
        open: LoopStage,
    },

    #[error("{name} ({cb_type}) ran outside any loop stage")]
    OutsideStage { name: String, cb_type: String },

    #[error("{name} ({cb_type}) cannot run during {stage:?}")]
    WrongStage {
        name: String,
        cb_type: String,
        stage: LoopStage,
    },
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
