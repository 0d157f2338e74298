//! Injectable diagnostics for tree construction and pruning.
//!
//! The loader reports what it does as [`TraceEvent`]s instead of logging
//! inline. [`LogObserver`] forwards them to the `log` facade; callers that
//! want to inspect or silence the stream pass their own observer.

use log::{debug, info};

/// A structured diagnostic emitted while building or pruning a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent<'a> {
    /// A record line parsed successfully
    RecordParsed { line: usize, name: &'a str },

    /// A node was attached under the node its registrar names
    ChildLinked { parent: &'a str, child: &'a str },

    /// The node with no resolvable registrar
    RootIdentified { name: &'a str },

    /// One dependency name resolved to a node
    DependencyResolved { name: &'a str, dependency: &'a str },

    /// Construction finished
    TreeBuilt { nodes: usize, root: &'a str },

    /// A node matched a prune predicate and was detached from its parent
    NodeDetached { name: &'a str },

    /// A node matched a prune predicate but has no parent to detach from
    DetachSkipped { name: &'a str },

    /// Pruning finished
    PruneFinished { detached: usize, retained: usize },
}

/// Receiver for [`TraceEvent`]s
pub trait TraceObserver {
    /// Handle one event
    fn observe(&mut self, event: TraceEvent<'_>);
}

/// Discards every event
impl TraceObserver for () {
    fn observe(&mut self, _event: TraceEvent<'_>) {}
}

/// Default observer: emits each event through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TraceObserver for LogObserver {
    fn observe(&mut self, event: TraceEvent<'_>) {
        match event {
            TraceEvent::RecordParsed { line, name } => {
                debug!("Parsed record {} on line {}", name, line)
            }
            TraceEvent::ChildLinked { parent, child } => {
                debug!("Linked {} under registrar {}", child, parent)
            }
            TraceEvent::RootIdentified { name } => debug!("Tree root: {}", name),
            TraceEvent::DependencyResolved { name, dependency } => {
                debug!("Node {} depends on {}", name, dependency)
            }
            TraceEvent::TreeBuilt { nodes, root } => {
                info!("Built callback tree with {} nodes rooted at {}", nodes, root)
            }
            TraceEvent::NodeDetached { name } => debug!("Removing node {}", name),
            TraceEvent::DetachSkipped { name } => {
                debug!("Node {} matched but has no parent; left in place", name)
            }
            TraceEvent::PruneFinished { detached, retained } => {
                info!("Pruned {} nodes, {} retained", detached, retained)
            }
        }
    }
}
