//! Core types for the node keeper
//!
//! Identifiers, roles and states shared by node records, claims and the
//! active-node index.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length of a full node identifier in bytes
pub const NODE_ID_LENGTH: usize = 32;

/// Globally unique identifier of a cluster node
///
/// Ordering is byte-wise lexicographic, so every node sorts an identical set
/// of identifiers into the same order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; NODE_ID_LENGTH]);

impl NodeId {
    /// Generate a new random node ID
    pub fn new() -> Self {
        let mut bytes = [0u8; NODE_ID_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LENGTH] {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl FromStr for NodeId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; NODE_ID_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Compact round-scoped node identifier used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShortNodeId(pub u32);

impl fmt::Display for ShortNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing round number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PulseNumber(pub u32);

/// First pulse number a running cluster produces
pub const FIRST_PULSE_NUMBER: PulseNumber = PulseNumber(65537);

impl PulseNumber {
    /// Following pulse; `None` once the counter is exhausted
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(PulseNumber)
    }
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static role a node holds for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticRole {
    Unknown,
    Virtual,
    HeavyMaterial,
    LightMaterial,
}

impl StaticRole {
    /// Role record id carried by join claims
    pub fn role_id(self) -> u16 {
        match self {
            StaticRole::Unknown => 0,
            StaticRole::Virtual => 1,
            StaticRole::HeavyMaterial => 2,
            StaticRole::LightMaterial => 3,
        }
    }

    /// Resolve a claim's role record id; `Unknown` is not admissible
    pub fn from_role_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(StaticRole::Virtual),
            2 => Some(StaticRole::HeavyMaterial),
            3 => Some(StaticRole::LightMaterial),
            _ => None,
        }
    }
}

impl fmt::Display for StaticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticRole::Unknown => write!(f, "unknown"),
            StaticRole::Virtual => write!(f, "virtual"),
            StaticRole::HeavyMaterial => write!(f, "heavy_material"),
            StaticRole::LightMaterial => write!(f, "light_material"),
        }
    }
}

impl FromStr for StaticRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(StaticRole::Unknown),
            "virtual" => Ok(StaticRole::Virtual),
            "heavy_material" | "heavymaterial" | "heavy" => Ok(StaticRole::HeavyMaterial),
            "light_material" | "lightmaterial" | "light" => Ok(StaticRole::LightMaterial),
            other => Err(format!("unknown static role '{}'", other)),
        }
    }
}

/// Role a node plays for a particular jet or object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicRole {
    Undefined,
    VirtualExecutor,
    VirtualValidator,
    LightExecutor,
    LightValidator,
    HeavyExecutor,
}

impl DynamicRole {
    /// Static role that is eligible to play this dynamic role
    pub fn static_role(self) -> StaticRole {
        match self {
            DynamicRole::VirtualExecutor | DynamicRole::VirtualValidator => StaticRole::Virtual,
            DynamicRole::LightExecutor | DynamicRole::LightValidator => StaticRole::LightMaterial,
            DynamicRole::HeavyExecutor => StaticRole::HeavyMaterial,
            DynamicRole::Undefined => StaticRole::Unknown,
        }
    }
}

/// Membership state of a node
///
/// `Joined -> Prepared -> Active -> Leaved`, with `Active <-> Suspended`.
/// `Leaved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Joined,
    Prepared,
    Active,
    Leaved,
    Suspended,
}

impl NodeState {
    pub fn can_transition_to(self, next: NodeState) -> bool {
        matches!(
            (self, next),
            (NodeState::Joined, NodeState::Prepared)
                | (NodeState::Prepared, NodeState::Active)
                | (NodeState::Active, NodeState::Leaved)
                | (NodeState::Active, NodeState::Suspended)
                | (NodeState::Suspended, NodeState::Active)
        )
    }
}

/// Lifecycle of the node keeper itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeeperState {
    #[default]
    Undefined,
    /// Waiting for the first promoted view
    Waiting,
    /// At least one view has been promoted
    Ready,
}
