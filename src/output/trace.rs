//! Trace file writer.
//!
//! Emits a tree back in the line format it was loaded from, one record per
//! line in registration order, so the file can be loaded again.

use crate::tree::CallbackTraceTree;
use crate::utils::error::OutputError;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialized records of the retained nodes, in registration order
pub fn trace_lines(tree: &CallbackTraceTree) -> Vec<String> {
    tree.registration_order()
        .into_iter()
        .map(|id| tree.record(id).serialize())
        .collect()
}

/// Write a tree to a trace file
///
/// **Public** - main entry point for trace output
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_trace(tree: &CallbackTraceTree, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Emitting {} callbacks to: {}", tree.len(), output_path.display());

    super::validate_path(output_path)?;
    super::ensure_parent_dir(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    for line in trace_lines(tree) {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;

    info!(
        "Trace written successfully ({} bytes)",
        super::calculate_file_size(output_path)
    );

    Ok(())
}
