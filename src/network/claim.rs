//! Referendum claims gossiped during a pulse
//!
//! Claims form a closed set: the merge step handles every variant of
//! [`Claim`] exhaustively. A join claim is self-describing and signed by the
//! joining node; the signature covers every field except itself.

use serde::{Deserialize, Serialize};

use crate::error::ClaimError;
use crate::network::node::PROTOCOL_VERSION;
use crate::network::types::{NodeId, ShortNodeId, StaticRole};
use crate::security::CryptographyService;

/// A node asking to be admitted into the active set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeJoinClaim {
    short_node_id: ShortNodeId,
    relay_node_id: ShortNodeId,
    protocol_version_and_flags: u32,
    joins_after: u32,
    node_role_rec_id: u16,
    node_ref: NodeId,
    node_address: String,
    node_pk: Vec<u8>,
    signature: Vec<u8>,
}

/// Borrowed view of the signed portion of a join claim
#[derive(Serialize)]
struct JoinClaimBody<'a> {
    short_node_id: ShortNodeId,
    relay_node_id: ShortNodeId,
    protocol_version_and_flags: u32,
    joins_after: u32,
    node_role_rec_id: u16,
    node_ref: &'a NodeId,
    node_address: &'a str,
    node_pk: &'a [u8],
}

impl NodeJoinClaim {
    /// Unsigned claim relaying through the node itself
    pub fn new(
        node_ref: NodeId,
        role: StaticRole,
        short_node_id: ShortNodeId,
        node_address: impl Into<String>,
        node_pk: Vec<u8>,
    ) -> Self {
        Self {
            short_node_id,
            relay_node_id: short_node_id,
            protocol_version_and_flags: u32::from(PROTOCOL_VERSION) << 16,
            joins_after: 0,
            node_role_rec_id: role.role_id(),
            node_ref,
            node_address: node_address.into(),
            node_pk,
            signature: Vec::new(),
        }
    }

    pub fn with_relay(mut self, relay: ShortNodeId) -> Self {
        self.relay_node_id = relay;
        self
    }

    pub fn with_joins_after(mut self, joins_after: u32) -> Self {
        self.joins_after = joins_after;
        self
    }

    pub fn with_protocol_flags(mut self, flags: u16) -> Self {
        self.protocol_version_and_flags = (self.protocol_version_and_flags & 0xFFFF_0000) | u32::from(flags);
        self
    }

    /// Raw role record id, as decoded from the wire
    pub fn with_role_rec_id(mut self, role_rec_id: u16) -> Self {
        self.node_role_rec_id = role_rec_id;
        self
    }

    /// Attach a signature produced elsewhere (e.g. decoded from a packet)
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    pub fn short_node_id(&self) -> ShortNodeId {
        self.short_node_id
    }

    pub fn relay_node_id(&self) -> ShortNodeId {
        self.relay_node_id
    }

    pub fn protocol_version_and_flags(&self) -> u32 {
        self.protocol_version_and_flags
    }

    pub fn protocol_version(&self) -> u16 {
        (self.protocol_version_and_flags >> 16) as u16
    }

    pub fn joins_after(&self) -> u32 {
        self.joins_after
    }

    pub fn node_role_rec_id(&self) -> u16 {
        self.node_role_rec_id
    }

    pub fn node_ref(&self) -> NodeId {
        self.node_ref
    }

    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    pub fn node_pk(&self) -> &[u8] {
        &self.node_pk
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Encoding of every field except the signature
    pub fn signable_bytes(&self) -> Result<Vec<u8>, ClaimError> {
        let body = JoinClaimBody {
            short_node_id: self.short_node_id,
            relay_node_id: self.relay_node_id,
            protocol_version_and_flags: self.protocol_version_and_flags,
            joins_after: self.joins_after,
            node_role_rec_id: self.node_role_rec_id,
            node_ref: &self.node_ref,
            node_address: &self.node_address,
            node_pk: &self.node_pk,
        };
        Ok(bincode::serialize(&body)?)
    }

    /// Sign the claim with the local key
    pub fn sign(mut self, crypto: &dyn CryptographyService) -> Result<Self, ClaimError> {
        let data = self.signable_bytes()?;
        let signature = crypto.sign(&data).map_err(ClaimError::Signing)?;
        self.signature = signature.into_bytes();
        Ok(self)
    }

    /// Check the signature against the public key the claim carries
    pub fn verify(&self, crypto: &dyn CryptographyService) -> bool {
        match self.signable_bytes() {
            Ok(data) => crypto.verify(&self.node_pk, &self.signature, &data),
            Err(_) => false,
        }
    }
}

/// A node announcing it leaves the active set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLeaveClaim {
    pub node_ref: NodeId,
}

/// Cluster-wide broadcast announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBroadcast {
    pub origin: NodeId,
    pub emergency_level: u8,
    pub announcement_id: u32,
}

/// Poll or activation of a node capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPollingAndActivation {
    pub origin: NodeId,
    pub polling_flags: u16,
    pub capability_type: u16,
    pub capability_ref: u64,
}

/// Accusation that a node violated the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeViolationBlame {
    pub origin: NodeId,
    pub blame_node: NodeId,
    pub type_violation: u8,
}

/// Referendum claim accumulated during a pulse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    Join(NodeJoinClaim),
    Leave(NodeLeaveClaim),
    Broadcast(NodeBroadcast),
    CapabilityPollingAndActivation(CapabilityPollingAndActivation),
    ViolationBlame(NodeViolationBlame),
}

impl Claim {
    pub fn leave(node_ref: NodeId) -> Self {
        Claim::Leave(NodeLeaveClaim { node_ref })
    }

    /// Node that made the claim
    pub fn claimant(&self) -> NodeId {
        match self {
            Claim::Join(c) => c.node_ref,
            Claim::Leave(c) => c.node_ref,
            Claim::Broadcast(c) => c.origin,
            Claim::CapabilityPollingAndActivation(c) => c.origin,
            Claim::ViolationBlame(c) => c.origin,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Claim::Join(_) => "join",
            Claim::Leave(_) => "leave",
            Claim::Broadcast(_) => "broadcast",
            Claim::CapabilityPollingAndActivation(_) => "capability",
            Claim::ViolationBlame(_) => "violation_blame",
        }
    }
}

impl From<NodeJoinClaim> for Claim {
    fn from(claim: NodeJoinClaim) -> Self {
        Claim::Join(claim)
    }
}

impl From<NodeLeaveClaim> for Claim {
    fn from(claim: NodeLeaveClaim) -> Self {
        Claim::Leave(claim)
    }
}
