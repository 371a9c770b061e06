//! 20-byte account address.

use std::fmt;

use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

use crate::Hash;

/// A 20-byte address, derived from a hash by truncation.
///
/// Consensus uses addresses in exactly one place: the `next_consensus` field
/// of a proposed header, which commits to the validator set of the following
/// block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const SIZE: usize = 20;

    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The last 20 bytes of a hash.
    pub fn from_hash(hash: &Hash) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash.as_bytes()[12..]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

impl Encode for Address {
    fn encode(&self, w: &mut BinWriter) {
        w.write_bytes(&self.0);
    }
}

impl Decode for Address {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.read_exact::<20>()?))
    }
}
