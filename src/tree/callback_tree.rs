//! Callback tree construction.
//!
//! A trace is a flat list of records. Each record names the record that
//! registered it; that link makes the registrar the parent. The single record
//! whose registrar is not in the trace is the root.
//!
//! Nodes live in an arena owned by [`CallbackTraceTree`]. Parent, child and
//! dependency links are [`NodeId`] indices into that arena, so a parent link
//! never keeps anything alive on its own.

use crate::parser::{parse_record, CallbackRecord};
use crate::utils::error::{LoadError, RecordError, TreeError};
use crate::utils::observer::{LogObserver, TraceEvent, TraceObserver};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in the arena (input line order, blank lines excluded)
    pub fn index(self) -> usize {
        self.0
    }
}

/// A record plus its links within the tree
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub(crate) record: CallbackRecord,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) dependencies: Vec<NodeId>,
}

impl TraceNode {
    fn new(record: CallbackRecord) -> Self {
        Self {
            record,
            parent: None,
            children: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn record(&self) -> &CallbackRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Direct parent; `None` for the root and for pruned nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in discovery order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Resolved dependencies, in the order the trace listed them
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }
}

/// The causal tree of one trace
#[derive(Debug, Clone)]
pub struct CallbackTraceTree {
    pub(crate) arena: Vec<TraceNode>,
    pub(crate) by_name: HashMap<String, NodeId>,
    pub(crate) root: NodeId,

    /// Retained nodes in stored order
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) retained: Vec<bool>,
}

impl CallbackTraceTree {
    /// Load a tree from a trace file
    ///
    /// **Public** - main entry point for loading
    ///
    /// # Errors
    /// * `LoadError::Io` - the file cannot be opened or read
    /// * `LoadError::Record` - a line fails to parse
    /// * `LoadError::Structure` - the records do not form a single tree
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::from_path_observed(path, &mut LogObserver)
    }

    /// [`from_path`](Self::from_path) reporting to a custom observer
    pub fn from_path_observed(
        path: impl AsRef<Path>,
        observer: &mut dyn TraceObserver,
    ) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader_observed(BufReader::new(file), observer)
    }

    /// Load a tree from any buffered reader, one record per line
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LoadError> {
        Self::from_reader_observed(reader, &mut LogObserver)
    }

    /// [`from_reader`](Self::from_reader) reporting to a custom observer
    ///
    /// Lines are read as bytes. A line that is not UTF-8 is a bad record
    /// (`LoadError::Record` with `RecordError::InvalidUtf8`); only failures
    /// of the reader itself become `LoadError::Io`.
    pub fn from_reader_observed<R: BufRead>(
        mut reader: R,
        observer: &mut dyn TraceObserver,
    ) -> Result<Self, LoadError> {
        let mut records = Vec::new();
        let mut buf = Vec::new();
        let mut line_number = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let line = std::str::from_utf8(&buf).map_err(|e| LoadError::Record {
                line: line_number,
                source: RecordError::InvalidUtf8 {
                    offset: e.valid_up_to(),
                },
            })?;
            if let Some(record) = parse_line(line_number, line, observer)? {
                records.push(record);
            }
        }
        Ok(Self::from_records_observed(records, observer)?)
    }

    /// Load a tree from in-memory lines
    pub fn from_lines<I, S>(lines: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_lines_observed(lines, &mut LogObserver)
    }

    /// [`from_lines`](Self::from_lines) reporting to a custom observer
    pub fn from_lines_observed<I, S>(
        lines: I,
        observer: &mut dyn TraceObserver,
    ) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        for (index, line) in lines.into_iter().enumerate() {
            if let Some(record) = parse_line(index + 1, line.as_ref(), observer)? {
                records.push(record);
            }
        }
        Ok(Self::from_records_observed(records, observer)?)
    }

    /// Link already-parsed records into a tree
    pub fn from_records(records: Vec<CallbackRecord>) -> Result<Self, TreeError> {
        Self::from_records_observed(records, &mut LogObserver)
    }

    /// [`from_records`](Self::from_records) reporting to a custom observer
    ///
    /// # Algorithm
    /// 1. Index nodes by name (names must be unique)
    /// 2. Attach each node under its registrar; the one node whose registrar
    ///    is unknown becomes the root
    /// 3. Check every node reaches the root through its parents
    /// 4. Resolve dependency names to node ids
    pub fn from_records_observed(
        records: Vec<CallbackRecord>,
        observer: &mut dyn TraceObserver,
    ) -> Result<Self, TreeError> {
        let mut arena: Vec<TraceNode> = records.into_iter().map(TraceNode::new).collect();

        let mut by_name = HashMap::with_capacity(arena.len());
        for (index, node) in arena.iter().enumerate() {
            if by_name.insert(node.record.name.clone(), NodeId(index)).is_some() {
                return Err(TreeError::DuplicateName(node.record.name.clone()));
            }
        }

        let root = link_parents(&mut arena, &by_name, observer)?;
        check_reaches_root(&arena, root)?;
        resolve_dependencies(&mut arena, &by_name, observer)?;

        let nodes: Vec<NodeId> = (0..arena.len()).map(NodeId).collect();
        let retained = vec![true; arena.len()];

        observer.observe(TraceEvent::TreeBuilt {
            nodes: nodes.len(),
            root: &arena[root.0].record.name,
        });

        Ok(Self {
            arena,
            by_name,
            root,
            nodes,
            retained,
        })
    }
}

/// Parse one input line, skipping blank ones
///
/// **Private** - shared by the line and reader loaders
fn parse_line(
    line_number: usize,
    line: &str,
    observer: &mut dyn TraceObserver,
) -> Result<Option<CallbackRecord>, LoadError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let record = parse_record(line).map_err(|source| LoadError::Record {
        line: line_number,
        source,
    })?;
    observer.observe(TraceEvent::RecordParsed {
        line: line_number,
        name: &record.name,
    });
    Ok(Some(record))
}

/// Attach every node to its registrar and find the root
///
/// **Private** - construction step
fn link_parents(
    arena: &mut [TraceNode],
    by_name: &HashMap<String, NodeId>,
    observer: &mut dyn TraceObserver,
) -> Result<NodeId, TreeError> {
    let mut root: Option<NodeId> = None;

    for index in 0..arena.len() {
        let Some(&parent) = by_name.get(&arena[index].record.registrar) else {
            if let Some(existing) = root {
                return Err(TreeError::MultipleRoots {
                    first: arena[existing.0].record.name.clone(),
                    second: arena[index].record.name.clone(),
                });
            }
            observer.observe(TraceEvent::RootIdentified {
                name: &arena[index].record.name,
            });
            root = Some(NodeId(index));
            continue;
        };

        check_child_fits(&arena[parent.0].record, &arena[index].record)?;

        arena[parent.0].children.push(NodeId(index));
        arena[index].parent = Some(parent);
        observer.observe(TraceEvent::ChildLinked {
            parent: &arena[parent.0].record.name,
            child: &arena[index].record.name,
        });
    }

    root.ok_or(TreeError::NoRoot)
}

/// A child sits one level below its parent in the same tree
fn check_child_fits(parent: &CallbackRecord, child: &CallbackRecord) -> Result<(), TreeError> {
    if parent.tree_number != child.tree_number {
        return Err(TreeError::TreeNumberMismatch {
            child: child.name.clone(),
            child_tree: child.tree_number,
            parent: parent.name.clone(),
            parent_tree: parent.tree_number,
        });
    }
    if parent.tree_level + 1 != child.tree_level {
        return Err(TreeError::LevelMismatch {
            child: child.name.clone(),
            child_level: child.tree_level,
            parent: parent.name.clone(),
            parent_level: parent.tree_level,
        });
    }
    Ok(())
}

/// Every upward walk must end at the root
///
/// **Private** - construction step; a walk longer than the node count is a cycle
fn check_reaches_root(arena: &[TraceNode], root: NodeId) -> Result<(), TreeError> {
    for (index, node) in arena.iter().enumerate() {
        if !reaches(arena, NodeId(index), root) {
            return Err(TreeError::Disconnected(node.record.name.clone()));
        }
    }
    Ok(())
}

/// Follow parent links from `start`; true if they lead to `root`
pub(crate) fn reaches(arena: &[TraceNode], start: NodeId, root: NodeId) -> bool {
    let mut current = start;
    for _ in 0..=arena.len() {
        if current == root {
            return true;
        }
        match arena[current.0].parent {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

/// Replace dependency names with node ids
///
/// **Private** - construction step
fn resolve_dependencies(
    arena: &mut [TraceNode],
    by_name: &HashMap<String, NodeId>,
    observer: &mut dyn TraceObserver,
) -> Result<(), TreeError> {
    for node in arena.iter_mut() {
        let mut resolved = Vec::with_capacity(node.record.dependencies.len());
        for dependency in &node.record.dependencies {
            let id = by_name
                .get(dependency)
                .copied()
                .ok_or_else(|| TreeError::UnresolvedDependency {
                    name: node.record.name.clone(),
                    dependency: dependency.clone(),
                })?;
            observer.observe(TraceEvent::DependencyResolved {
                name: &node.record.name,
                dependency,
            });
            resolved.push(id);
        }
        node.dependencies = resolved;
    }
    Ok(())
}
