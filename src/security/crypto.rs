//! Cryptography capability used by the node keeper
//!
//! The keeper never touches key material directly. It signs its own join
//! claim and verifies peers' claims through [`CryptographyService`], which is
//! injected at construction. [`Ed25519CryptographyService`] is the default
//! implementation backed by `ring`.

use std::fmt;
use std::path::Path;

use ring::{
    digest,
    rand::SystemRandom,
    signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an exported Ed25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Public key held by a cryptography service
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// Detached signature produced by a cryptography service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0))
    }
}

/// Sign/verify and key export primitives consumed by the node keeper
pub trait CryptographyService: Send + Sync {
    /// Sign `data` with the local private key
    fn sign(&self, data: &[u8]) -> Result<Signature, CryptoError>;

    /// Public key matching the local private key
    fn get_public_key(&self) -> Result<PublicKey, CryptoError>;

    /// Export a public key into the byte form carried by claims
    fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, CryptoError>;

    /// Verify `signature` over `data` against an exported public key
    fn verify(&self, public_key: &[u8], signature: &[u8], data: &[u8]) -> bool;
}

/// Ed25519 cryptography service
pub struct Ed25519CryptographyService {
    key_pair: Ed25519KeyPair,
    pkcs8: Vec<u8>,
}

impl Ed25519CryptographyService {
    /// Generate a fresh key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| CryptoError::KeyGenerationFailed)?;
        Self::from_pkcs8(document.as_ref())
    }

    /// Load a key pair from PKCS#8 DER bytes
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, CryptoError> {
        let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| CryptoError::KeyRejected(e.to_string()))?;
        Ok(Self {
            key_pair,
            pkcs8: pkcs8.to_vec(),
        })
    }

    /// Load a key pair from a file holding PKCS#8 DER bytes
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| CryptoError::KeyRejected(e.to_string()))?;
        Self::from_pkcs8(&bytes)
    }

    /// PKCS#8 encoding of the private key, suitable for persisting
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }
}

impl fmt::Debug for Ed25519CryptographyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519CryptographyService")
            .field("public_key", &hex::encode(self.key_pair.public_key().as_ref()))
            .finish()
    }
}

impl CryptographyService for Ed25519CryptographyService {
    fn sign(&self, data: &[u8]) -> Result<Signature, CryptoError> {
        Ok(Signature::from_bytes(self.key_pair.sign(data).as_ref()))
    }

    fn get_public_key(&self) -> Result<PublicKey, CryptoError> {
        Ok(PublicKey::from_bytes(self.key_pair.public_key().as_ref()))
    }

    fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        if key.as_bytes().len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: key.as_bytes().len(),
            });
        }
        Ok(key.as_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], signature: &[u8], data: &[u8]) -> bool {
        UnparsedPublicKey::new(&signature::ED25519, public_key)
            .verify(data, signature)
            .is_ok()
    }
}

/// SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed")]
    KeyGenerationFailed,
    #[error("Key rejected: {0}")]
    KeyRejected(String),
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Public key unavailable: {0}")]
    KeyUnavailable(String),
}
