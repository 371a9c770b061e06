//! PrepareRequest body.

use dbft_types::{Address, Hash};
use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

/// Upper bound on transactions in one proposal; decoding rejects anything
/// larger before allocating.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 512;

/// The Primary's block proposal.
///
/// Fixes every header field of the block under agreement: the ordered
/// transaction set, the timestamp/nonce pair, and the address of the next
/// height's validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    /// Proposed header timestamp, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Proposed header nonce.
    pub nonce: u64,
    /// Address of the next block's validator set.
    pub next_consensus: Address,
    /// Ordered hashes of the proposed transactions.
    pub transaction_hashes: Vec<Hash>,
}

impl Encode for PrepareRequest {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u64(self.timestamp);
        w.write_u64(self.nonce);
        self.next_consensus.encode(w);
        w.write_array(&self.transaction_hashes);
    }
}

impl Decode for PrepareRequest {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            timestamp: r.read_u64()?,
            nonce: r.read_u64()?,
            next_consensus: Address::decode(r)?,
            transaction_hashes: r.read_array(MAX_TRANSACTIONS_PER_BLOCK as u64)?,
        })
    }
}
