//! Node records
//!
//! A [`Node`] describes one cluster member as of a given pulse. Records are
//! handed out by value; only the keeper's merge path advances their state.

use ring::digest;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::network::types::{NodeId, NodeState, PulseNumber, ShortNodeId, StaticRole};
use crate::security::sha256;

/// Protocol version spoken by this build
pub const PROTOCOL_VERSION: u16 = 1;

/// Information about a cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    role: StaticRole,
    state: NodeState,
    public_key: Vec<u8>,
    address: String,
    short_id: ShortNodeId,
    protocol_version: u16,
    pulse_num: PulseNumber,
}

impl Node {
    /// Create an active node record with a short id derived from `id`
    pub fn new(id: NodeId, role: StaticRole, public_key: Vec<u8>, address: impl Into<String>) -> Self {
        Self {
            id,
            role,
            state: NodeState::Active,
            public_key,
            address: address.into(),
            short_id: generate_short_id(&id),
            protocol_version: PROTOCOL_VERSION,
            pulse_num: PulseNumber::default(),
        }
    }

    /// Record for a node that has only claimed to join
    pub(crate) fn joined(
        id: NodeId,
        role: StaticRole,
        public_key: Vec<u8>,
        address: String,
        short_id: ShortNodeId,
        protocol_version: u16,
    ) -> Self {
        Self {
            id,
            role,
            state: NodeState::Joined,
            public_key,
            address,
            short_id,
            protocol_version,
            pulse_num: PulseNumber::default(),
        }
    }

    pub fn with_short_id(mut self, short_id: ShortNodeId) -> Self {
        self.short_id = short_id;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> StaticRole {
        self.role
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn short_id(&self) -> ShortNodeId {
        self.short_id
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    /// Pulse after which the current state applies
    pub fn pulse_num(&self) -> PulseNumber {
        self.pulse_num
    }

    /// Move to `next`, effective after `pulse`
    pub(crate) fn transition(&mut self, next: NodeState, pulse: PulseNumber) -> Result<(), StateError> {
        if !self.state.can_transition_to(next) {
            return Err(StateError { from: self.state, to: next });
        }
        self.state = next;
        self.pulse_num = pulse;
        Ok(())
    }
}

/// Derive the default short id for a node identifier
pub fn generate_short_id(id: &NodeId) -> ShortNodeId {
    let bytes = sha256(id.as_bytes());
    ShortNodeId(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Digest of a node set, independent of the order `nodes` is given in
pub fn calculate_nodes_hash(nodes: &[Node]) -> Vec<u8> {
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by_key(|node| node.id);

    let mut ctx = digest::Context::new(&digest::SHA256);
    for node in sorted {
        ctx.update(node.id.as_bytes());
        ctx.update(&node.role.role_id().to_be_bytes());
        ctx.update(&node.short_id.0.to_be_bytes());
        ctx.update(&(node.public_key.len() as u32).to_be_bytes());
        ctx.update(&node.public_key);
        ctx.update(&(node.address.len() as u32).to_be_bytes());
        ctx.update(node.address.as_bytes());
    }
    ctx.finish().as_ref().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(role: StaticRole) -> Node {
        Node::new(NodeId::new(), role, vec![7; 32], "127.0.0.1:13831")
    }

    #[test]
    fn test_new_node_is_active() {
        let n = node(StaticRole::Virtual);
        assert_eq!(n.state(), NodeState::Active);
        assert_eq!(n.short_id(), generate_short_id(&n.id()));
        assert_eq!(n.protocol_version(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_short_id_is_digest_prefix() {
        let id = NodeId::from_bytes([0u8; 32]);
        let digest = sha256(id.as_bytes());
        assert_eq!(generate_short_id(&id).0.to_be_bytes(), digest[..4]);
    }

    #[test]
    fn test_transition_stamps_pulse() {
        let mut n = Node::joined(
            NodeId::new(),
            StaticRole::HeavyMaterial,
            vec![],
            "10.0.0.1:1".to_string(),
            ShortNodeId(9),
            PROTOCOL_VERSION,
        );
        n.transition(NodeState::Prepared, PulseNumber(10)).unwrap();
        n.transition(NodeState::Active, PulseNumber(11)).unwrap();
        assert_eq!(n.state(), NodeState::Active);
        assert_eq!(n.pulse_num(), PulseNumber(11));

        let err = n.transition(NodeState::Joined, PulseNumber(12)).unwrap_err();
        assert_eq!(err, StateError { from: NodeState::Active, to: NodeState::Joined });
        assert_eq!(n.pulse_num(), PulseNumber(11));
    }

    #[test]
    fn test_nodes_hash_ignores_input_order() {
        let a = node(StaticRole::Virtual);
        let b = node(StaticRole::LightMaterial);
        let forward = calculate_nodes_hash(&[a.clone(), b.clone()]);
        let backward = calculate_nodes_hash(&[b.clone(), a.clone()]);
        assert_eq!(forward, backward);

        let changed = calculate_nodes_hash(&[a, b.with_short_id(ShortNodeId(1))]);
        assert_ne!(forward, changed);
    }
}
