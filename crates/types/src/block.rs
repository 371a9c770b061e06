//! Block and header types.

use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

use crate::{Address, Hash, KeyPair, PublicKey, Signature, Transaction};

/// Canonical block header.
///
/// The header bytes are what Commit signatures cover: every field here is
/// fixed by the PrepareRequest (plus chain state), so all honest validators
/// sign identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Height of this block.
    pub index: u32,
    /// Hash of the previous block's header.
    pub prev_hash: Hash,
    /// Merkle root of the ordered transaction hashes.
    pub merkle_root: Hash,
    /// Proposal timestamp, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Proposal nonce.
    pub nonce: u64,
    /// Address committing to the next block's validator set.
    pub next_consensus: Address,
}

impl Header {
    /// Hash of the canonical header encoding.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.to_bytes())
    }

    /// Sign this header with a validator key (the Commit signature).
    pub fn sign(&self, key: &KeyPair) -> Signature {
        key.sign(self.hash().as_bytes())
    }

    /// Verify a Commit signature over this header.
    pub fn verify(&self, key: &PublicKey, signature: &Signature) -> bool {
        key.verify(self.hash().as_bytes(), signature)
    }
}

impl Encode for Header {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u32(self.index);
        self.prev_hash.encode(w);
        self.merkle_root.encode(w);
        w.write_u64(self.timestamp);
        w.write_u64(self.nonce);
        self.next_consensus.encode(w);
    }
}

impl Decode for Header {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            index: r.read_u32()?,
            prev_hash: Hash::decode(r)?,
            merkle_root: Hash::decode(r)?,
            timestamp: r.read_u64()?,
            nonce: r.read_u64()?,
            next_consensus: Address::decode(r)?,
        })
    }
}

/// One validator's Commit signature, attached to a finalized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitWitness {
    pub validator_index: u16,
    pub signature: Signature,
}

/// A block as assembled by consensus.
///
/// Identity is the header hash alone; the witness set may legitimately
/// differ between nodes (any quorum of valid Commit signatures works).
#[derive(Debug, Clone)]
pub struct Block {
    pub header: Header,
    /// Transactions in the order fixed by the PrepareRequest.
    pub transactions: Vec<Transaction>,
    /// Commit signatures collected at finalization, ordered by validator
    /// index. Empty until a commit quorum exists.
    pub witness: Vec<CommitWitness>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn transaction_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }
}
