//! REAM node network
//!
//! Cluster membership for a pulse-driven ledger: the node keeper maintains
//! the authoritative active-node set, collects join and leave claims during
//! a pulse and promotes the merged view at the pulse boundary.

pub mod types;
pub mod node;
pub mod claim;
pub mod claim_queue;
pub mod index;
pub mod unsync;
pub mod keeper;
pub mod round;

// Re-export core types
pub use types::*;
pub use node::{calculate_nodes_hash, generate_short_id, Node, PROTOCOL_VERSION};
pub use claim::{
    CapabilityPollingAndActivation, Claim, NodeBroadcast, NodeJoinClaim, NodeLeaveClaim,
    NodeViolationBlame,
};
pub use claim_queue::ClaimQueue;
pub use index::{ActiveIndex, IndexError, IndexStats, RecordRefSet};
pub use unsync::{DropReason, DroppedClaim, MergeReport, UnsyncList};
pub use keeper::{GracefulStop, KeeperStats, NodeKeeper};
pub use round::{RoundDriver, RoundExit};

use std::net::{TcpListener, UdpSocket};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Certificate, KeeperConfig, TransportConfig, TransportProtocol};
use crate::error::KeeperResult;
use crate::security::CryptographyService;

/// Build the node keeper for the local node
///
/// The origin is seeded into the active set straight away when the cluster
/// has no discovery nodes or the origin is one of them; otherwise it waits
/// to be admitted through its own join claim.
pub fn new_node_network(
    config: &KeeperConfig,
    certificate: &Certificate,
    cryptography: Arc<dyn CryptographyService>,
) -> KeeperResult<NodeKeeper> {
    let origin = create_origin(&config.transport, certificate)?;
    let keeper = NodeKeeper::new(origin.clone(), cryptography);
    if certificate.discovery_nodes.is_empty() || certificate.origin_is_discovery() {
        keeper.add_active_nodes(vec![origin]);
    }
    keeper.set_state(KeeperState::Waiting);
    Ok(keeper)
}

/// Origin record from the transport configuration and the certificate
pub fn create_origin(transport: &TransportConfig, certificate: &Certificate) -> KeeperResult<Node> {
    let address = resolve_address(transport)?;

    let mut role = certificate.role;
    if role == StaticRole::Unknown {
        info!("no role in certificate, using {}", StaticRole::LightMaterial);
        role = StaticRole::LightMaterial;
    }

    Ok(Node::new(
        certificate.reference,
        role,
        certificate.public_key_bytes()?,
        address,
    ))
}

/// Concrete address peers can reach this node at
pub fn resolve_address(transport: &TransportConfig) -> KeeperResult<String> {
    if transport.behind_nat {
        if let Some(public) = &transport.public_address {
            return Ok(public.clone());
        }
        warn!("behind_nat set without public_address, falling back to local address");
    }

    let local = match transport.protocol {
        TransportProtocol::Tcp => TcpListener::bind(&transport.address)?.local_addr()?,
        TransportProtocol::Udp => UdpSocket::bind(&transport.address)?.local_addr()?,
    };
    Ok(local.to_string())
}
