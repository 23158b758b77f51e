//! Active-node index
//!
//! The committed membership view: a primary map keyed by [`NodeId`] plus a
//! role index and a short-id index. All three are mutated together through
//! [`ActiveIndex::insert`] and [`ActiveIndex::remove`], which keep the
//! following invariant: a node is in the primary map if and only if it is in
//! exactly one role set and owns exactly one short-id entry.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::network::node::Node;
use crate::network::types::{NodeId, NodeState, ShortNodeId, StaticRole};

/// Deduplicated set of node identifiers
#[derive(Debug, Clone, Default)]
pub struct RecordRefSet {
    refs: HashSet<NodeId>,
}

impl RecordRefSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: NodeId) -> bool {
        self.refs.insert(id)
    }

    pub fn remove(&mut self, id: &NodeId) -> bool {
        self.refs.remove(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.refs.contains(id)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Members sorted by identifier
    pub fn collect(&self) -> Vec<NodeId> {
        let mut refs: Vec<NodeId> = self.refs.iter().copied().collect();
        refs.sort();
        refs
    }
}

/// Sizes of the three index structures, read under one lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub nodes: usize,
    pub role_entries: usize,
    pub short_ids: usize,
}

/// Reasons the index refuses a node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("node {id} is {state:?}, only active nodes are indexed")]
    NotActive { id: NodeId, state: NodeState },

    #[error("short id {short_id} is already held by {holder}")]
    ShortIdTaken { short_id: ShortNodeId, holder: NodeId },

    #[error("node {0} has left the cluster")]
    PermanentlyLeft(NodeId),
}

#[derive(Debug, Default)]
pub struct ActiveIndex {
    active: HashMap<NodeId, Node>,
    by_role: HashMap<StaticRole, RecordRefSet>,
    by_short_id: HashMap<ShortNodeId, NodeId>,
    leaved: HashSet<NodeId>,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an active node, returning the record it replaced
    pub fn insert(&mut self, node: Node) -> Result<Option<Node>, IndexError> {
        let id = node.id();
        if node.state() != NodeState::Active {
            return Err(IndexError::NotActive { id, state: node.state() });
        }
        if self.leaved.contains(&id) {
            return Err(IndexError::PermanentlyLeft(id));
        }
        if let Some(holder) = self.short_id_holder(node.short_id()) {
            if holder != id {
                return Err(IndexError::ShortIdTaken {
                    short_id: node.short_id(),
                    holder,
                });
            }
        }

        let previous = self.remove(&id);
        self.by_role.entry(node.role()).or_default().add(id);
        self.by_short_id.insert(node.short_id(), id);
        self.active.insert(id, node);
        Ok(previous)
    }

    /// Remove a node from the primary map and both derived indices
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.active.remove(id)?;
        if self.by_short_id.get(&node.short_id()) == Some(id) {
            self.by_short_id.remove(&node.short_id());
        }
        if let Some(set) = self.by_role.get_mut(&node.role()) {
            set.remove(id);
            if set.is_empty() {
                self.by_role.remove(&node.role());
            }
        }
        Some(node)
    }

    /// Remove a node for good; later inserts of the same identifier fail
    pub fn retire(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.remove(id)?;
        self.leaved.insert(*id);
        Some(node)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.active.get(id)
    }

    pub fn get_by_short_id(&self, short_id: ShortNodeId) -> Option<&Node> {
        self.by_short_id.get(&short_id).and_then(|id| self.active.get(id))
    }

    pub fn short_id_holder(&self, short_id: ShortNodeId) -> Option<NodeId> {
        self.by_short_id.get(&short_id).copied()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.active.contains_key(id)
    }

    pub fn has_left(&self, id: &NodeId) -> bool {
        self.leaved.contains(id)
    }

    /// Members of `role` sorted by identifier, `None` when the role is empty
    pub fn role_members(&self, role: StaticRole) -> Option<Vec<NodeId>> {
        self.by_role.get(&role).map(RecordRefSet::collect)
    }

    /// Copy of every node sorted by identifier
    pub fn sorted_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.active.values().cloned().collect();
        nodes.sort_by_key(Node::id);
        nodes
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            nodes: self.active.len(),
            role_entries: self.by_role.values().map(RecordRefSet::len).sum(),
            short_ids: self.by_short_id.len(),
        }
    }

    /// Check the three structures describe the same node set
    pub fn is_consistent(&self) -> bool {
        let stats = self.stats();
        if stats.nodes != stats.role_entries || stats.nodes != stats.short_ids {
            return false;
        }
        let nodes_indexed = self.active.iter().all(|(id, node)| {
            node.id() == *id
                && self.by_role.get(&node.role()).map_or(false, |set| set.contains(id))
                && self.by_short_id.get(&node.short_id()) == Some(id)
        });
        let roles_backed = self.by_role.iter().all(|(role, set)| {
            !set.is_empty()
                && set
                    .refs
                    .iter()
                    .all(|id| self.active.get(id).map_or(false, |n| n.role() == *role))
        });
        let short_ids_backed = self
            .by_short_id
            .iter()
            .all(|(short_id, id)| self.active.get(id).map_or(false, |n| n.short_id() == *short_id));

        nodes_indexed && roles_backed && short_ids_backed
    }
}
