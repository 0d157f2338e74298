//! Callback record parsing and serialization.
//!
//! One line of an instrumented libuv trace describes one callback:
//!
//! ```text
//! <name> <0x1> | <context> <0x2> | ... | <start_time> <3s 120ns> | ... | <dependencies> <0x4 0x7>
//! ```
//!
//! Every field is validated and converted to its typed form here, once, so
//! nothing downstream ever re-parses a string.

use super::callback_type::{CallbackBehavior, CallbackType, LoopStage};
use crate::utils::config::{
    FIELD_DELIMITER, NANOS_PER_SECOND, NON_USER_TAG, OPTIONAL_KEYS, REQUIRED_KEYS,
    SERIALIZED_DELIMITER,
};
use crate::utils::error::RecordError;
use std::collections::HashMap;
use std::fmt;

/// One callback invocation (or marker) observed during tracing
#[derive(Debug, Clone)]
pub struct CallbackRecord {
    pub name: String,
    pub context: String,
    pub context_type: String,

    /// Callback pointer, when the runtime emits it
    pub cb: Option<String>,

    pub cb_type: CallbackType,
    pub cb_behavior: CallbackBehavior,
    pub tree_number: i64,
    pub tree_level: i64,
    pub level_entry: i64,

    /// Rank in execution order; non-positive for callbacks that never ran
    pub exec_id: i64,

    /// Rank in registration order
    pub reg_id: i64,

    pub callback_info: String,

    /// Name of the node that registered this one
    pub registrar: String,

    pub tree_parent: String,

    /// Nanoseconds
    pub registration_time: u64,
    pub start_time: u64,
    pub end_time: u64,

    pub executing_thread: String,
    pub active: bool,
    pub finished: bool,
    pub extra_info: String,

    /// Names of the nodes this one depends on
    pub dependencies: Vec<String>,
}

/// Parse one trace line into a record
///
/// **Public** - main entry point for record parsing
///
/// # Errors
/// * `RecordError::EmptyLine` - nothing but whitespace
/// * `RecordError::MalformedSegment` - a segment is not `<key> <value>`
/// * `RecordError::DuplicateKey` / `RecordError::UnknownKey` / `RecordError::MissingField`
/// * `RecordError::InvalidInteger` - a numeric field does not parse
/// * `RecordError::MalformedTime` / `RecordError::TimeOverflow` - bad `<N>s <M>ns` value
/// * `RecordError::NonMonotonicTime` - an executed callback's times go backwards
pub fn parse_record(line: &str) -> Result<CallbackRecord, RecordError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(RecordError::EmptyLine);
    }

    let mut fields = FieldMap::from_line(line)?;

    let record = CallbackRecord {
        name: fields.take("name")?,
        context: fields.take("context")?,
        context_type: fields.take("context_type")?,
        cb: fields.take_optional("cb"),
        cb_type: fields.take("cb_type")?.parse().unwrap_or_else(|e| match e {}),
        cb_behavior: fields
            .take("cb_behavior")?
            .parse()
            .unwrap_or_else(|e| match e {}),
        tree_number: fields.take_int("tree_number")?,
        tree_level: fields.take_int("tree_level")?,
        level_entry: fields.take_int("level_entry")?,
        exec_id: fields.take_int("exec_id")?,
        reg_id: fields.take_int("reg_id")?,
        callback_info: fields.take("callback_info")?,
        registrar: fields.take("registrar")?,
        tree_parent: fields.take("tree_parent")?,
        registration_time: fields.take_time("registration_time")?,
        start_time: fields.take_time("start_time")?,
        end_time: fields.take_time("end_time")?,
        executing_thread: fields.take("executing_thread")?,
        active: fields.take_int("active")? != 0,
        finished: fields.take_int("finished")? != 0,
        extra_info: fields.take("extra_info")?,
        dependencies: fields
            .take("dependencies")?
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    };

    record.check_time_order()?;
    Ok(record)
}

/// Key/value pairs of one line, consumed field by field
///
/// **Private** - validation boundary for parse_record
struct FieldMap<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> FieldMap<'a> {
    fn from_line(line: &'a str) -> Result<Self, RecordError> {
        let mut values = HashMap::new();

        for (index, segment) in line.split(FIELD_DELIMITER).enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            // Tolerate a leading label such as "Callback 12:"
            if index == 0 && !segment.starts_with('<') && segment.ends_with(':') {
                continue;
            }

            let (key, value) = split_segment(segment)
                .ok_or_else(|| RecordError::MalformedSegment(segment.to_string()))?;

            if !REQUIRED_KEYS.contains(&key) && !OPTIONAL_KEYS.contains(&key) {
                return Err(RecordError::UnknownKey(key.to_string()));
            }
            if values.insert(key, value).is_some() {
                return Err(RecordError::DuplicateKey(key.to_string()));
            }
        }

        Ok(Self { values })
    }

    fn take(&mut self, key: &'static str) -> Result<String, RecordError> {
        self.values
            .remove(key)
            .map(str::to_string)
            .ok_or(RecordError::MissingField(key))
    }

    fn take_optional(&mut self, key: &'static str) -> Option<String> {
        self.values.remove(key).map(str::to_string)
    }

    fn take_int(&mut self, key: &'static str) -> Result<i64, RecordError> {
        let value = self.take(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidInteger { field: key, value })
    }

    fn take_time(&mut self, key: &'static str) -> Result<u64, RecordError> {
        let value = self.take(key)?;
        parse_time_ns(key, &value)
    }
}

/// Split `<key> <value>` into its parts; the value may be empty
///
/// **Private** - internal utility
fn split_segment(segment: &str) -> Option<(&str, &str)> {
    let rest = segment.strip_prefix('<')?;
    let (key, rest) = rest.split_once('>')?;
    if key.is_empty() {
        return None;
    }

    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        // key and value must be separated by whitespace
        return None;
    }

    let value = trimmed.strip_prefix('<')?.strip_suffix('>')?;
    Some((key, value))
}

/// Convert `<N>s <M>ns` to nanoseconds
///
/// **Public** - exposed for tools that read raw trace timestamps
pub fn parse_time_ns(field: &'static str, value: &str) -> Result<u64, RecordError> {
    let malformed = || RecordError::MalformedTime {
        field,
        value: value.to_string(),
    };

    let (secs, rest) = value.trim().split_once('s').ok_or_else(malformed)?;
    let nanos = rest.trim_start();
    if nanos.len() == rest.len() {
        return Err(malformed());
    }
    let nanos = nanos.strip_suffix("ns").ok_or_else(malformed)?;

    let secs = parse_digits(secs).ok_or_else(malformed)?;
    let nanos = parse_digits(nanos).ok_or_else(malformed)?;

    secs.checked_mul(NANOS_PER_SECOND)
        .and_then(|ns| ns.checked_add(nanos))
        .ok_or_else(|| RecordError::TimeOverflow {
            field,
            value: value.to_string(),
        })
}

/// Unsigned decimal with no sign or whitespace
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Render nanoseconds as `<N>s <M>ns`
pub fn format_time_ns(ns: u64) -> String {
    format!("{}s {}ns", ns / NANOS_PER_SECOND, ns % NANOS_PER_SECOND)
}

impl CallbackRecord {
    /// Serialize back to the trace line format
    ///
    /// Keys come out in canonical order. `parse_record` of the result yields a
    /// record with the same field values.
    pub fn serialize(&self) -> String {
        let mut segments: Vec<String> = Vec::with_capacity(REQUIRED_KEYS.len() + 1);
        let mut push = |key: &str, value: &str| segments.push(format!("<{}> <{}>", key, value));

        push("name", &self.name);
        push("context", &self.context);
        push("context_type", &self.context_type);
        if let Some(cb) = &self.cb {
            push("cb", cb);
        }
        push("cb_type", &self.cb_type.to_string());
        push("cb_behavior", &self.cb_behavior.to_string());
        push("tree_number", &self.tree_number.to_string());
        push("tree_level", &self.tree_level.to_string());
        push("level_entry", &self.level_entry.to_string());
        push("exec_id", &self.exec_id.to_string());
        push("reg_id", &self.reg_id.to_string());
        push("callback_info", &self.callback_info);
        push("registrar", &self.registrar);
        push("tree_parent", &self.tree_parent);
        push("registration_time", &format_time_ns(self.registration_time));
        push("start_time", &format_time_ns(self.start_time));
        push("end_time", &format_time_ns(self.end_time));
        push("executing_thread", &self.executing_thread);
        push("active", if self.active { "1" } else { "0" });
        push("finished", if self.finished { "1" } else { "0" });
        push("extra_info", &self.extra_info);
        push("dependencies", &self.dependencies.join(" "));

        segments.join(SERIALIZED_DELIMITER)
    }

    /// Executed or currently executing
    pub fn executed(&self) -> bool {
        self.active || self.finished
    }

    pub fn is_marker(&self) -> bool {
        self.cb_type.is_marker()
    }

    pub fn is_threadpool(&self) -> bool {
        self.cb_type.is_threadpool()
    }

    pub fn is_run_timers(&self) -> bool {
        self.cb_type.is_run_timers()
    }

    pub fn is_run_pending(&self) -> bool {
        self.cb_type.is_run_pending()
    }

    pub fn is_run_idle(&self) -> bool {
        self.cb_type.is_run_idle()
    }

    pub fn is_run_prepare(&self) -> bool {
        self.cb_type.is_run_prepare()
    }

    pub fn is_run_check(&self) -> bool {
        self.cb_type.is_run_check()
    }

    pub fn is_run_closing(&self) -> bool {
        self.cb_type.is_run_closing()
    }

    pub fn is_io_poll(&self) -> bool {
        self.cb_type.is_io_poll()
    }

    pub fn is_async(&self) -> bool {
        self.cb_type.is_async()
    }

    pub fn is_begin_marker(&self) -> bool {
        self.cb_type.is_begin_marker()
    }

    pub fn is_end_marker(&self) -> bool {
        self.cb_type.is_end_marker()
    }

    pub fn loop_stage(&self) -> Option<LoopStage> {
        self.cb_type.loop_stage()
    }

    /// Application code, as opposed to markers and internal libuv callbacks
    /// (e.g. the `UV_ASYNC_CB` the threadpool uses) that look like user code
    pub fn is_user_code(&self) -> bool {
        !self.is_marker() && !self.extra_info.contains(NON_USER_TAG)
    }

    /// Time spent running the callback, for executed callbacks
    pub fn duration_ns(&self) -> Option<u64> {
        self.executed()
            .then(|| self.end_time.saturating_sub(self.start_time))
    }

    /// Time between registration and start, for executed callbacks
    pub fn queue_delay_ns(&self) -> Option<u64> {
        self.executed()
            .then(|| self.start_time.saturating_sub(self.registration_time))
    }

    fn check_time_order(&self) -> Result<(), RecordError> {
        if !self.executed() {
            return Ok(());
        }

        let pairs = [
            ("registration_time", self.registration_time, "start_time", self.start_time),
            ("start_time", self.start_time, "end_time", self.end_time),
        ];
        for (earlier_field, earlier, later_field, later) in pairs {
            if earlier > later {
                return Err(RecordError::NonMonotonicTime {
                    name: self.name.clone(),
                    earlier_field,
                    earlier,
                    later_field,
                    later,
                });
            }
        }
        Ok(())
    }
}

/// Records are identified by name
impl PartialEq for CallbackRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CallbackRecord {}

impl fmt::Display for CallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl std::str::FromStr for CallbackRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_record(s)
    }
}
