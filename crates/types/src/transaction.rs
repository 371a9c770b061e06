//! Opaque transaction wrapper.

use bytes::Bytes;

use crate::Hash;

/// A transaction as consensus sees it: raw bytes plus a cached hash.
///
/// The engine never interprets transaction contents. Validity is the host's
/// concern (`verify_block`); consensus only orders hashes and ferries the
/// bytes into the assembled block.
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    data: Bytes,
    hash: Hash,
}

impl Transaction {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let hash = Hash::digest(&data);
        Self { data, hash }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transaction({:?}, {} bytes)", self.hash, self.data.len())
    }
}
