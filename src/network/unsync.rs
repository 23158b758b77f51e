//! Candidate ("unsync") view and the merge algorithm
//!
//! An [`UnsyncList`] is built at the start of a pulse from a snapshot of the
//! active set plus the claims drained for that pulse. Promotion happens in
//! two steps:
//!
//! 1. [`UnsyncList::prepare`] runs without any keeper lock held. It checks
//!    signatures and role ids and turns join claims into prepared records.
//! 2. [`MergeBatch::apply`] runs under the active-index write lock. It applies
//!    leaves first, then joins in queue order, resolving identifier and
//!    short-id conflicts in favour of the earliest claim.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::network::claim::{Claim, NodeJoinClaim};
use crate::network::index::{ActiveIndex, IndexError};
use crate::network::node::{calculate_nodes_hash, Node};
use crate::network::types::{NodeId, NodeState, PulseNumber, ShortNodeId, StaticRole};
use crate::security::CryptographyService;

/// Why a claim was discarded during a merge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("signature does not verify against the claimed public key")]
    BadSignature,

    #[error("role record id {0} does not name a known static role")]
    UnknownRole(u16),

    #[error("short id {short_id} is already held by {holder}")]
    ShortIdCollision { short_id: ShortNodeId, holder: NodeId },

    #[error("an earlier claim for the same node was admitted this pulse")]
    DuplicateJoin,

    #[error("node is already active")]
    AlreadyActive,

    #[error("node has left the cluster")]
    PermanentlyLeft,

    #[error("index rejected node: {0}")]
    Rejected(IndexError),

    #[error("{0}")]
    IllegalTransition(StateError),
}

/// A claim discarded during a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedClaim {
    pub claimant: NodeId,
    pub reason: DropReason,
}

/// Outcome of promoting one candidate view
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub pulse: PulseNumber,
    /// Nodes admitted into the active set, in queue order
    pub admitted: Vec<Node>,
    /// Nodes removed from the active set, stamped `Leaved`
    pub removed: Vec<Node>,
    #[serde(skip)]
    pub dropped: Vec<DroppedClaim>,
    /// Claims without membership effect
    pub ignored: usize,
    /// The local node's own leave was acknowledged by this merge
    pub left_cluster: bool,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty() && self.removed.is_empty() && self.dropped.is_empty() && self.ignored == 0
    }
}

/// Working view for one pulse
#[derive(Debug, Clone)]
pub struct UnsyncList {
    pulse: PulseNumber,
    slots: Vec<Option<Node>>,
    claims: Vec<Claim>,
}

impl UnsyncList {
    /// Candidate view over a snapshot of the active set
    pub fn new(pulse: PulseNumber, mut active_nodes: Vec<Node>) -> Self {
        active_nodes.sort_by_key(Node::id);
        Self {
            pulse,
            slots: active_nodes.into_iter().map(Some).collect(),
            claims: Vec::new(),
        }
    }

    /// Candidate view with `length` empty slots
    ///
    /// Used by a node that does not know the active list yet; slots are
    /// filled with [`UnsyncList::set_node`] as peers describe themselves.
    pub fn sparse(pulse: PulseNumber, length: usize) -> Self {
        Self {
            pulse,
            slots: vec![None; length],
            claims: Vec::new(),
        }
    }

    pub fn pulse(&self) -> PulseNumber {
        self.pulse
    }

    /// Fill slot `index`; `false` when the index is out of range
    pub fn set_node(&mut self, index: usize, node: Node) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(node);
                true
            }
            None => false,
        }
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Append claims, keeping their order
    pub fn add_claims(&mut self, claims: impl IntoIterator<Item = Claim>) {
        self.claims.extend(claims);
    }

    /// Drop every claim made by `claimant`, returning how many were removed
    pub fn remove_claims(&mut self, claimant: &NodeId) -> usize {
        let before = self.claims.len();
        self.claims.retain(|claim| claim.claimant() != *claimant);
        before - self.claims.len()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn into_claims(self) -> Vec<Claim> {
        self.claims
    }

    /// Number of slots, filled or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identifier at a position of the node ordering; `None` for an unfilled slot
    pub fn index_to_ref(&self, index: usize) -> Option<NodeId> {
        self.node(index).map(Node::id)
    }

    /// Position of a node in the node ordering
    pub fn ref_to_index(&self, id: &NodeId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().map_or(false, |node| node.id() == *id))
    }

    /// Digest of the filled slots
    pub fn calculate_hash(&self) -> Vec<u8> {
        let nodes: Vec<Node> = self.slots.iter().flatten().cloned().collect();
        calculate_nodes_hash(&nodes)
    }

    /// Validate claims and split them into joins and leaves
    pub(crate) fn prepare(self, crypto: &dyn CryptographyService) -> MergeBatch {
        let mut batch = MergeBatch {
            pulse: self.pulse,
            joins: Vec::new(),
            leaves: Vec::new(),
            dropped: Vec::new(),
            ignored: 0,
        };

        for claim in self.claims {
            match claim {
                Claim::Join(join) => match prepare_join(&join, self.pulse, crypto) {
                    Ok(node) => batch.joins.push(node),
                    Err(reason) => batch.drop_claim(join.node_ref(), reason),
                },
                Claim::Leave(leave) => batch.leaves.push(leave.node_ref),
                other @ (Claim::Broadcast(_)
                | Claim::CapabilityPollingAndActivation(_)
                | Claim::ViolationBlame(_)) => {
                    debug!(kind = other.kind(), claimant = %other.claimant(), "claim has no membership effect");
                    batch.ignored += 1;
                }
            }
        }
        batch
    }
}

fn prepare_join(
    claim: &NodeJoinClaim,
    pulse: PulseNumber,
    crypto: &dyn CryptographyService,
) -> Result<Node, DropReason> {
    if !claim.verify(crypto) {
        return Err(DropReason::BadSignature);
    }
    let role = StaticRole::from_role_id(claim.node_role_rec_id())
        .ok_or(DropReason::UnknownRole(claim.node_role_rec_id()))?;

    let mut node = Node::joined(
        claim.node_ref(),
        role,
        claim.node_pk().to_vec(),
        claim.node_address().to_string(),
        claim.short_node_id(),
        claim.protocol_version(),
    );
    node.transition(NodeState::Prepared, pulse)
        .map_err(DropReason::IllegalTransition)?;
    Ok(node)
}

/// Validated claims ready to be applied to the active index
#[derive(Debug)]
pub(crate) struct MergeBatch {
    pulse: PulseNumber,
    joins: Vec<Node>,
    leaves: Vec<NodeId>,
    dropped: Vec<DroppedClaim>,
    ignored: usize,
}

impl MergeBatch {
    fn drop_claim(&mut self, claimant: NodeId, reason: DropReason) {
        warn!(node = %claimant, pulse = %self.pulse, %reason, "dropping claim");
        self.dropped.push(DroppedClaim { claimant, reason });
    }

    /// Apply leaves, then joins, to `index`
    ///
    /// `left_cluster` in the returned report is set when `origin` was active
    /// and has been removed by this batch.
    pub(crate) fn apply(mut self, index: &mut ActiveIndex, origin: &NodeId) -> MergeReport {
        let pulse = self.pulse;
        let mut removed = Vec::new();
        let mut left_cluster = false;

        for id in std::mem::take(&mut self.leaves) {
            let Some(mut node) = index.retire(&id) else {
                debug!(node = %id, %pulse, "leave claim for inactive node");
                continue;
            };
            if let Err(err) = node.transition(NodeState::Leaved, pulse) {
                warn!(node = %id, %err, "removed node with unexpected state");
            }
            info!(node = %id, role = %node.role(), %pulse, "node left active set");
            if id == *origin {
                left_cluster = true;
            }
            removed.push(node);
        }

        let mut admitted = Vec::new();
        let mut admitted_ids = HashSet::new();
        for mut node in std::mem::take(&mut self.joins) {
            let id = node.id();
            let rejection = if admitted_ids.contains(&id) {
                Some(DropReason::DuplicateJoin)
            } else if index.has_left(&id) {
                Some(DropReason::PermanentlyLeft)
            } else if index.contains(&id) {
                Some(DropReason::AlreadyActive)
            } else {
                index
                    .short_id_holder(node.short_id())
                    .map(|holder| DropReason::ShortIdCollision {
                        short_id: node.short_id(),
                        holder,
                    })
            };
            if let Some(reason) = rejection {
                self.drop_claim(id, reason);
                continue;
            }

            if let Err(err) = node.transition(NodeState::Active, pulse) {
                self.drop_claim(id, DropReason::IllegalTransition(err));
                continue;
            }
            if let Err(err) = index.insert(node.clone()) {
                self.drop_claim(id, DropReason::Rejected(err));
                continue;
            }
            info!(node = %id, role = %node.role(), short_id = %node.short_id(), %pulse, "node joined active set");
            admitted_ids.insert(id);
            admitted.push(node);
        }

        MergeReport {
            pulse,
            admitted,
            removed,
            dropped: self.dropped,
            ignored: self.ignored,
            left_cluster,
        }
    }
}
