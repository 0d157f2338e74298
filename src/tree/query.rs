//! Lookups, orderings and traversals over a callback tree.
//!
//! All queries see only the retained nodes: after [`CallbackTraceTree::remove`]
//! pruned nodes disappear from lookups and orderings.
//!
//! Methods taking a [`NodeId`] expect an id handed out by the same tree and
//! panic on an id from a larger one. Use [`CallbackTraceTree::get`] when the
//! id's origin is not known.

use super::callback_tree::{reaches, CallbackTraceTree, NodeId, TraceNode};
use crate::parser::CallbackRecord;
use crate::utils::error::TreeError;
use std::collections::HashSet;

impl CallbackTraceTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Retained nodes in stored (input) order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    ///
    /// Ids handed out by this tree stay valid after pruning.
    ///
    /// # Panics
    /// If `id` came from another tree with more nodes than this one.
    pub fn node(&self, id: NodeId) -> &TraceNode {
        &self.arena[id.0]
    }

    /// Node by id, or `None` if `id` is out of range for this tree
    pub fn get(&self, id: NodeId) -> Option<&TraceNode> {
        self.arena.get(id.0)
    }

    /// # Panics
    /// If `id` came from another tree with more nodes than this one.
    pub fn record(&self, id: NodeId) -> &CallbackRecord {
        &self.arena[id.0].record
    }

    /// Iterate retained nodes with their ids
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TraceNode)> + '_ {
        self.nodes.iter().map(move |&id| (id, &self.arena[id.0]))
    }

    /// True if `id` is still part of the tree
    pub fn is_retained(&self, id: NodeId) -> bool {
        self.retained.get(id.0).copied().unwrap_or(false)
    }

    /// True if walking up from `id` reaches the root
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.arena.len() && reaches(&self.arena, id, self.root)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name
            .get(name)
            .copied()
            .filter(|&id| self.is_retained(id))
    }

    /// Node with the given registration id, if any
    pub fn node_by_registration_id(&self, reg_id: i64) -> Option<NodeId> {
        self.iter()
            .find(|(_, node)| node.record.reg_id == reg_id)
            .map(|(id, _)| id)
    }

    /// Node with the given execution id, if any
    pub fn node_by_execution_id(&self, exec_id: i64) -> Option<NodeId> {
        self.iter()
            .find(|(_, node)| node.record.exec_id == exec_id)
            .map(|(id, _)| id)
    }

    /// Nodes sorted by execution id; ties keep stored order
    pub fn execution_order(&self) -> Vec<NodeId> {
        let mut order = self.nodes.clone();
        order.sort_by_key(|&id| self.arena[id.0].record.exec_id);
        order
    }

    /// Nodes sorted by registration id; ties keep stored order
    pub fn registration_order(&self) -> Vec<NodeId> {
        let mut order = self.nodes.clone();
        order.sort_by_key(|&id| self.arena[id.0].record.reg_id);
        order
    }

    /// Executed nodes only, in execution order
    pub fn executed_schedule(&self) -> Vec<NodeId> {
        self.execution_order()
            .into_iter()
            .filter(|&id| self.arena[id.0].record.executed())
            .collect()
    }

    /// The node executed immediately before `id`
    ///
    /// Returns `Ok(None)` for nodes that never ran (`exec_id <= 0`).
    ///
    /// # Errors
    /// * `TreeError::NotInExecutionOrder` - `id` is not in this tree's
    ///   execution order, or nothing precedes it. Either means the caller
    ///   passed a node that does not belong here.
    pub fn execution_predecessor(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        let record = self.record(id);
        if record.exec_id <= 0 {
            return Ok(None);
        }

        let order = self.execution_order();
        match order
            .iter()
            .position(|&other| self.arena[other.0].record.exec_id == record.exec_id)
        {
            Some(position) if position > 0 => Ok(Some(order[position - 1])),
            _ => Err(TreeError::NotInExecutionOrder {
                name: record.name.clone(),
                exec_id: record.exec_id,
            }),
        }
    }

    /// True if a node with `candidate`'s registration id sits anywhere below
    /// `ancestor`
    ///
    /// Matching is by `reg_id`, so `candidate` may be a copy of a node rather
    /// than the node itself.
    pub fn is_ancestor_of(&self, ancestor: NodeId, candidate: &CallbackRecord) -> bool {
        let mut stack: Vec<NodeId> = self.arena[ancestor.0].children.clone();
        while let Some(current) = stack.pop() {
            let node = &self.arena[current.0];
            if node.record.reg_id == candidate.reg_id {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }

    /// All retained nodes `id` is an ancestor of, in stored order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut below: HashSet<i64> = HashSet::new();
        let mut stack: Vec<NodeId> = self.arena[id.0].children.clone();
        while let Some(current) = stack.pop() {
            let node = &self.arena[current.0];
            below.insert(node.record.reg_id);
            stack.extend(node.children.iter().copied());
        }

        self.iter()
            .filter(|(_, node)| below.contains(&node.record.reg_id))
            .map(|(id, _)| id)
            .collect()
    }

    /// Pre-order traversal from `start` (the root when `None`)
    ///
    /// Visits a node, then each of its children in order.
    pub fn walk<F>(&self, start: Option<NodeId>, mut visitor: F)
    where
        F: FnMut(NodeId, &TraceNode),
    {
        for id in self.preorder(start.unwrap_or(self.root)) {
            visitor(id, &self.arena[id.0]);
        }
    }

    /// Ids in pre-order from `start`
    pub fn preorder(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.arena[current.0].children.iter().rev().copied());
        }
        order
    }

    /// Parent chain from `id` upward, nearest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.arena[id.0].parent;
        while let Some(parent) = current {
            if chain.len() > self.arena.len() {
                break;
            }
            chain.push(parent);
            current = self.arena[parent.0].parent;
        }
        chain
    }
}
