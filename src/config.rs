//! Configuration for the node keeper
//!
//! The runtime configuration is TOML; the node certificate, which fixes the
//! local identity and the discovery nodes, is JSON.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::types::{NodeId, PulseNumber, StaticRole, FIRST_PULSE_NUMBER};

/// Node keeper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub transport: TransportConfig,
    pub round: RoundConfig,
    pub log: LogConfig,
}

impl KeeperConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: KeeperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        if self.round.pulse_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "round.pulse_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.round.first_pulse == 0 {
            return Err(ConfigError::InvalidValue {
                field: "round.first_pulse",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Transport protocols the address resolver knows how to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
}

/// Host transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub protocol: TransportProtocol,
    /// Listen address; port 0 lets the OS choose
    pub address: String,
    pub behind_nat: bool,
    /// Externally reachable address, required when behind NAT
    pub public_address: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: TransportProtocol::Tcp,
            address: "127.0.0.1:0".to_string(),
            behind_nat: false,
            public_address: None,
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.address
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "transport.address",
                message: e.to_string(),
            })?;
        if self.behind_nat && self.public_address.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "transport.public_address",
                message: "required when behind_nat is set".to_string(),
            });
        }
        Ok(())
    }
}

/// Pulse round timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    pub pulse_interval_ms: u64,
    pub first_pulse: u32,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            pulse_interval_ms: 10_000,
            first_pulse: FIRST_PULSE_NUMBER.0,
        }
    }
}

impl RoundConfig {
    pub fn first_pulse(&self) -> PulseNumber {
        PulseNumber(self.first_pulse)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A discovery node listed in the certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryNode {
    #[serde(with = "hex_node_id")]
    pub reference: NodeId,
    pub host: String,
    pub public_key: String,
}

/// Node certificate: local identity plus the cluster's discovery nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(with = "hex_node_id")]
    pub reference: NodeId,
    #[serde(default = "default_role")]
    pub role: StaticRole,
    /// Hex-encoded public key
    pub public_key: String,
    #[serde(default)]
    pub discovery_nodes: Vec<DiscoveryNode>,
}

fn default_role() -> StaticRole {
    StaticRole::Unknown
}

impl Certificate {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.public_key).map_err(|e| ConfigError::InvalidValue {
            field: "certificate.public_key",
            message: e.to_string(),
        })
    }

    /// Whether the local node is itself one of the discovery nodes
    pub fn origin_is_discovery(&self) -> bool {
        self.discovery_nodes.iter().any(|n| n.reference == self.reference)
    }
}

mod hex_node_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::network::types::NodeId;

    pub fn serialize<S: Serializer>(id: &NodeId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeId, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = KeeperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.round.first_pulse(), FIRST_PULSE_NUMBER);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = KeeperConfig::from_toml_str(
            r#"
            [transport]
            protocol = "udp"
            address = "0.0.0.0:13831"

            [round]
            pulse_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.protocol, TransportProtocol::Udp);
        assert_eq!(config.round.pulse_interval_ms, 500);
        assert_eq!(config.round.first_pulse, FIRST_PULSE_NUMBER.0);
    }

    #[test]
    fn test_nat_requires_public_address() {
        let err = KeeperConfig::from_toml_str(
            r#"
            [transport]
            behind_nat = true
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "transport.public_address", .. }));
    }

    #[test]
    fn test_bad_address_rejected() {
        let err = KeeperConfig::from_toml_str("[transport]\naddress = \"not-an-address\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "transport.address", .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[log]\nlevel = \"debug\"").unwrap();
        let config = KeeperConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log.level, "debug");

        let missing = KeeperConfig::from_file("/nonexistent/keeper.toml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_certificate_parsing() {
        let origin = NodeId::new();
        let other = NodeId::new();
        let json = format!(
            r#"{{
                "reference": "{origin}",
                "role": "heavy_material",
                "public_key": "0a0b",
                "discovery_nodes": [
                    {{ "reference": "{other}", "host": "10.0.0.2:13831", "public_key": "01" }},
                    {{ "reference": "{origin}", "host": "10.0.0.1:13831", "public_key": "0a0b" }}
                ]
            }}"#
        );
        let cert = Certificate::from_json_str(&json).unwrap();
        assert_eq!(cert.reference, origin);
        assert_eq!(cert.role, StaticRole::HeavyMaterial);
        assert_eq!(cert.public_key_bytes().unwrap(), vec![0x0a, 0x0b]);
        assert!(cert.origin_is_discovery());
    }

    #[test]
    fn test_certificate_role_defaults_to_unknown() {
        let json = format!(r#"{{ "reference": "{}", "public_key": "" }}"#, NodeId::new());
        let cert = Certificate::from_json_str(&json).unwrap();
        assert_eq!(cert.role, StaticRole::Unknown);
        assert!(cert.discovery_nodes.is_empty());
        assert!(!cert.origin_is_discovery());
    }
}
