//! Foundation types for the dBFT consensus engine.
//!
//! This crate provides the types everything else is built from:
//!
//! - **Primitives**: [`Hash`], [`Address`], cryptographic keys and signatures
//! - **Consensus types**: [`Transaction`], [`Block`], [`Header`]
//! - **Helpers**: merkle root computation, consensus-address derivation
//!
//! It is self-contained apart from the wire layer: no other workspace crate
//! sits below it.

mod address;
mod block;
mod crypto;
mod hash;
mod merkle;
mod transaction;

pub use address::Address;
pub use block::{Block, CommitWitness, Header};
pub use crypto::{consensus_address, CryptoError, KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use merkle::merkle_root;
pub use transaction::Transaction;
