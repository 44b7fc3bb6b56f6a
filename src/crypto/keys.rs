//! ECDSA key management
//!
//! Key pair handling, deterministic child key derivation from a wallet seed,
//! and DER signatures over 32-byte digests, all on secp256k1.

use std::fmt;

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::tagged_sha256;

/// Length of a compressed secp256k1 public key
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Key derivation produced no valid secret for {0}")]
    DerivationExhausted(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Stable handle for a remote node: its compressed public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerIdentity([u8; PUBLIC_KEY_SIZE]);

impl PeerIdentity {
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(key.serialize())
    }

    /// Parse from raw bytes, rejecting anything that is not a valid point
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let key = parse_public_key(bytes)?;
        Ok(Self::from_public_key(&key))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({})", self.to_hex())
    }
}

impl TryFrom<String> for PeerIdentity {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(value).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_slice(&bytes)
    }
}

impl From<PeerIdentity> for String {
    fn from(id: PeerIdentity) -> Self {
        id.to_hex()
    }
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Sign a 32-byte digest, returning a DER-encoded signature
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        sign_digest(&self.secret_key, digest)
    }
}

/// Parse a compressed (or uncompressed) public key, validating the curve point
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    PublicKey::from_slice(bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Derive a child secret from a seed.
///
/// The secret is `SHA256(seed || tag || data || counter)` for the first
/// counter value that yields a valid scalar.
pub fn derive_secret_key(seed: &[u8], tag: &str, data: &[u8]) -> Result<SecretKey, KeyError> {
    for counter in 0u32..256 {
        let digest = tagged_sha256(&[seed, tag.as_bytes(), data, &counter.to_be_bytes()]);
        if let Ok(secret) = SecretKey::from_slice(&digest) {
            return Ok(secret);
        }
    }
    Err(KeyError::DerivationExhausted(tag.to_string()))
}

/// Sign a 32-byte digest with a secret key, DER encoded
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_der().to_vec())
}

/// Verify a DER signature over a 32-byte digest
pub fn verify_digest(
    public_key: &PublicKey,
    digest: &[u8; 32],
    der_signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let sig = Signature::from_der(der_signature).map_err(|_| KeyError::InvalidSignature)?;

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
