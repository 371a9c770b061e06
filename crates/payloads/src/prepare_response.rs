//! PrepareResponse body.

use dbft_types::Hash;
use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

/// A Backup's endorsement of the Primary's proposal, identified by the hash
/// of the PrepareRequest payload it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareResponse {
    pub preparation_hash: Hash,
}

impl Encode for PrepareResponse {
    fn encode(&self, w: &mut BinWriter) {
        self.preparation_hash.encode(w);
    }
}

impl Decode for PrepareResponse {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            preparation_hash: Hash::decode(r)?,
        })
    }
}
