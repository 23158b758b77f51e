//! REAM node keeper security layer
//!
//! Provides the cryptography capability the node keeper uses to sign its
//! own join claim and to authenticate the claims of joining peers.

pub mod crypto;

// Re-export main types
pub use crypto::{
    sha256, CryptoError, CryptographyService, Ed25519CryptographyService, PublicKey, Signature,
    PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
