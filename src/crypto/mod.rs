//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256, double SHA-256 and HASH160 digests
//! - ECDSA key management (secp256k1)
//! - Deterministic child key derivation

pub mod hash;
pub mod keys;

pub use hash::{double_sha256, hash160, sha256, tagged_sha256};
pub use keys::{
    derive_secret_key, parse_public_key, sign_digest, verify_digest, KeyError, KeyPair,
    PeerIdentity, PUBLIC_KEY_SIZE,
};
