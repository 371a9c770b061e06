//! The host interface: everything the engine needs from the outside world.

use dbft_payloads::ConsensusPayload;
use dbft_types::{consensus_address, Address, Block, Hash, KeyPair, PublicKey, Transaction};
use thiserror::Error;

use crate::Context;

/// Reason a host rejected a payload during semantic verification.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct VerifyError(pub String);

/// Callbacks the engine invokes into the surrounding node.
///
/// The engine calls these synchronously while holding its state; they must
/// not block. `broadcast`, `request_transactions` and `process_block` are
/// fire-and-forget from the engine's perspective and should buffer
/// internally.
///
/// Methods with default implementations mirror the permissive defaults of
/// the reference implementation; the rest are genuinely node-specific.
pub trait Host {
    /// Resolve the local signing key against an ordered validator set.
    /// `None` means this node is a spectator at that height.
    fn key_pair(&self, validators: &[PublicKey]) -> Option<(u16, KeyPair)>;

    /// Ordered validator set for `height`. Must be identical on every
    /// honest node and non-empty.
    fn validators(&mut self, height: u32) -> Vec<PublicKey>;

    /// Height of the last accepted block.
    fn current_height(&self) -> u32;

    /// Hash of the last accepted block.
    fn current_block_hash(&self) -> Hash;

    /// Fetch a transaction from the mempool, if present.
    fn transaction(&mut self, hash: &Hash) -> Option<Transaction>;

    /// Verified candidate transactions for a new proposal, in the order
    /// they should appear in the block. Primary only.
    fn verified_transactions(&mut self) -> Vec<Transaction>;

    /// Ask the network layer to fetch transactions we are missing.
    fn request_transactions(&mut self, hashes: &[Hash]);

    /// Whether an assembled block satisfies node policy.
    fn verify_block(&mut self, block: &Block) -> bool {
        let _ = block;
        true
    }

    /// Semantic checks on a PrepareRequest beyond structure and sender.
    fn verify_prepare_request(&mut self, payload: &ConsensusPayload) -> Result<(), VerifyError> {
        let _ = payload;
        Ok(())
    }

    /// Semantic checks on a PrepareResponse beyond structure and sender.
    fn verify_prepare_response(&mut self, payload: &ConsensusPayload) -> Result<(), VerifyError> {
        let _ = payload;
        Ok(())
    }

    /// Assemble a block from the context. The default builds the standard
    /// header plus transactions in proposal order; hosts with their own
    /// block format override this.
    fn new_block_from_context(&mut self, context: &Context) -> Option<Block> {
        context.create_block()
    }

    /// Deterministic address of an ordered validator set, used to validate
    /// a proposal's `next_consensus` field.
    fn consensus_address(&mut self, validators: &[PublicKey]) -> Address {
        consensus_address(validators)
    }

    /// Send a payload to all consensus peers.
    fn broadcast(&mut self, payload: ConsensusPayload);

    /// Persist a finalized block.
    fn process_block(&mut self, block: &Block);

    /// Force spectator mode even when the key is in the validator set.
    fn watch_only(&self) -> bool {
        false
    }
}

/// Find `key` in an ordered validator set.
///
/// The usual `Host::key_pair` implementation for nodes with a single fixed
/// key.
pub fn resolve_key_pair(key: &KeyPair, validators: &[PublicKey]) -> Option<(u16, KeyPair)> {
    let public = key.public_key();
    validators
        .iter()
        .position(|candidate| *candidate == public)
        .map(|index| (index as u16, key.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_key_pair_finds_position() {
        let keys: Vec<KeyPair> = (1..=4).map(|i| KeyPair::from_seed([i; 32])).collect();
        let validators: Vec<PublicKey> = keys.iter().map(KeyPair::public_key).collect();

        let (index, resolved) = resolve_key_pair(&keys[2], &validators).unwrap();
        assert_eq!(index, 2);
        assert_eq!(resolved.public_key(), keys[2].public_key());

        let outsider = KeyPair::from_seed([99; 32]);
        assert!(resolve_key_pair(&outsider, &validators).is_none());
    }
}
