//! Merkle root over ordered transaction hashes.

use crate::Hash;

/// Compute the merkle root of an ordered hash list.
///
/// Pairs are combined as `blake3(left ‖ right)`; an unpaired trailing node is
/// promoted to the next level unchanged. The empty list has root
/// [`Hash::ZERO`], a single hash is its own root.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    match hashes.len() {
        0 => Hash::ZERO,
        1 => hashes[0],
        _ => {
            let mut level: Vec<Hash> = hashes.to_vec();
            while level.len() > 1 {
                let mut next = Vec::with_capacity(level.len().div_ceil(2));
                for pair in level.chunks(2) {
                    match pair {
                        [left, right] => next.push(combine(left, right)),
                        [odd] => next.push(*odd),
                        _ => unreachable!(),
                    }
                }
                level = next;
            }
            level[0]
        }
    }
}

fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    Hash::digest(&data)
}
