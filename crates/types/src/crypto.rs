//! Ed25519 keys and signatures.
//!
//! Thin newtypes over `ed25519-dalek` so the rest of the workspace never
//! touches the underlying library directly. Commit signatures are plain
//! ed25519 over the 32-byte header hash.

use std::fmt;

use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use crate::{Address, Hash};

/// Error constructing a key from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid public key encoding")]
    InvalidPublicKey,
}

/// A validator's 32-byte ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const SIZE: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        // Reject byte strings that are not a curve point up front, so a key
        // that decodes is always usable for verification.
        VerifyingKey::from_bytes(&bytes)
            .map(|_| Self(bytes))
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

/// A 64-byte ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const SIZE: usize = 64;

    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// All-zero signature, never valid. Useful as a test stand-in.
    pub const fn zero() -> Self {
        Self([0u8; 64])
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}", &hex::encode(self.0)[..8])
    }
}

impl Encode for Signature {
    fn encode(&self, w: &mut BinWriter) {
        w.write_bytes(&self.0);
    }
}

impl Decode for Signature {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.read_exact::<64>()?))
    }
}

/// A validator's signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Derive a key pair from a 32-byte seed. Deterministic; tests use this
    /// with seeded RNGs so validator identities are reproducible.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.secret.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.secret.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// Deterministic address of an ordered validator set.
///
/// Every honest node derives the same address for the same ordered key list;
/// a proposed header's `next_consensus` field must match the address of the
/// next height's validators.
pub fn consensus_address(validators: &[PublicKey]) -> Address {
    let mut hasher = blake3::Hasher::new();
    for key in validators {
        hasher.update(key.as_bytes());
    }
    Address::from_hash(&Hash::new(*hasher.finalize().as_bytes()))
}
