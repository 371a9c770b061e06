//! Commit body.

use dbft_types::Signature;
use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

/// A validator's signature over the header that would be assembled from the
/// current context. A quorum of these finalizes the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub signature: Signature,
}

impl Encode for Commit {
    fn encode(&self, w: &mut BinWriter) {
        self.signature.encode(w);
    }
}

impl Decode for Commit {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            signature: Signature::decode(r)?,
        })
    }
}
