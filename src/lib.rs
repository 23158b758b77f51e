//! # REAM node keeper
//!
//! Cluster membership and consensus-view management for a pulse-driven,
//! permissioned ledger. Once per pulse the node keeper merges the join and
//! leave claims gossiped during that pulse into a new active-node view and
//! promotes it atomically.
//!
//! The wire transport, pulse distribution and key storage live elsewhere;
//! this crate consumes them through [`security::CryptographyService`], a
//! pulse channel for [`network::RoundDriver`] and [`network::GracefulStop`].

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod network;
pub mod security;
/// Command-line interface and argument parsing
pub mod cli;
/// Command execution
pub mod commands;

// Re-export main types
pub use config::{Certificate, KeeperConfig};
pub use error::{ClaimError, ConfigError, KeeperError, KeeperResult, StateError};
pub use network::{new_node_network, Claim, MergeReport, Node, NodeId, NodeKeeper, RoundDriver};
pub use security::{CryptographyService, Ed25519CryptographyService};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
