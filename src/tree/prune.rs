//! Pruning nodes out of a callback tree.

use super::callback_tree::{CallbackTraceTree, NodeId};
use crate::parser::CallbackRecord;
use crate::utils::observer::{LogObserver, TraceEvent, TraceObserver};

impl CallbackTraceTree {
    /// Remove every node for which `predicate` is true
    ///
    /// Walks the tree in pre-order. Each matching node is dropped from its
    /// parent's child list and loses its parent link. Its own children are
    /// **not** detached or re-parented: they still point at the removed node,
    /// are no longer reachable from the root, and so drop out of the tree
    /// along with it. Afterwards the tree keeps exactly the nodes whose parent
    /// chain still reaches the root.
    ///
    /// The root has no parent and is never detached, even if it matches.
    ///
    /// This is destructive and one-shot. The orphaned subtrees are not
    /// re-validated or restored; only prune nodes whose descendants you mean
    /// to discard.
    ///
    /// # Returns
    /// Ids of the detached nodes, in walk order
    pub fn remove<F>(&mut self, predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&CallbackRecord) -> bool,
    {
        self.remove_observed(predicate, &mut LogObserver)
    }

    /// [`remove`](Self::remove) reporting to a custom observer
    pub fn remove_observed<F>(
        &mut self,
        mut predicate: F,
        observer: &mut dyn TraceObserver,
    ) -> Vec<NodeId>
    where
        F: FnMut(&CallbackRecord) -> bool,
    {
        // Pre-order over the structure as it stands before any detaching
        let order = self.preorder(self.root);
        let mut detached = Vec::new();

        for id in order {
            if !predicate(&self.arena[id.0].record) {
                continue;
            }

            let Some(parent) = self.arena[id.0].parent.take() else {
                observer.observe(TraceEvent::DetachSkipped {
                    name: &self.arena[id.0].record.name,
                });
                continue;
            };

            self.arena[parent.0].children.retain(|&child| child != id);
            observer.observe(TraceEvent::NodeDetached {
                name: &self.arena[id.0].record.name,
            });
            detached.push(id);
        }

        let kept: Vec<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|&id| self.contains(id))
            .collect();
        for &id in &self.nodes {
            self.retained[id.0] = false;
        }
        for &id in &kept {
            self.retained[id.0] = true;
        }
        self.nodes = kept;

        observer.observe(TraceEvent::PruneFinished {
            detached: detached.len(),
            retained: self.nodes.len(),
        });

        detached
    }
}
