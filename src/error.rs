//! Error types for the REAM node keeper
//!
//! Failures that make further round participation meaningless (cryptography,
//! self identity, configuration) surface here. Per-claim validation failures
//! during a merge are not errors; see [`crate::network::DropReason`].

use thiserror::Error;

use crate::network::types::{NodeState, PulseNumber};
use crate::security::CryptoError;

/// Main error type for node keeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    /// Cryptography errors (key export, signing)
    #[error("Cryptography error: {0}")]
    Crypto(#[from] CryptoError),

    /// Claim encoding or signing errors
    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Round driver received a pulse that does not advance the round
    #[error("Stale pulse {received}: last processed pulse is {last}")]
    StalePulse {
        received: PulseNumber,
        last: PulseNumber,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Claim encoding and signing errors
#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Failed to serialize claim: {0}")]
    Serialization(String),

    #[error("Failed to sign claim: {0}")]
    Signing(#[source] CryptoError),

    #[error("Failed to export public key: {0}")]
    KeyExport(#[source] CryptoError),
}

impl From<bincode::Error> for ClaimError {
    fn from(err: bincode::Error) -> Self {
        ClaimError::Serialization(err.to_string())
    }
}

/// Node state machine violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal node state transition {from:?} -> {to:?}")]
pub struct StateError {
    pub from: NodeState,
    pub to: NodeState,
}

/// Configuration and certificate loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid certificate: {0}")]
    Certificate(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Result type for node keeper operations
pub type KeeperResult<T> = Result<T, KeeperError>;
