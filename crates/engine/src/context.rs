//! Per-height consensus state.

use std::collections::HashMap;

use dbft_payloads::{ConsensusPayload, Message};
use dbft_types::{merkle_root, Address, Block, Hash, Header, KeyPair, PublicKey, Transaction};

use crate::timer::HeightView;

/// All mutable state for the height under agreement.
///
/// The engine owns the context exclusively; the host only ever sees `&self`
/// (through `Host::new_block_from_context`). Slot vectors are indexed by
/// validator index and hold the last accepted payload of their kind.
///
/// Reset discipline:
/// - entering a new height clears everything and refetches the validators;
/// - advancing the view clears the preparation slots and the proposal
///   fields, but keeps Commit and ChangeView slots. Commits must survive so
///   a block can still finalize at the view it was committed in; ChangeViews
///   must survive so late quorums still form.
#[derive(Debug)]
pub struct Context {
    /// Height being agreed on.
    pub block_index: u32,
    /// Current view within this height.
    pub view_number: u8,
    /// Ordered validator keys for this height.
    pub validators: Vec<PublicKey>,
    /// Our position in `validators`, `None` when not in the set.
    pub my_index: Option<u16>,
    /// Primary of the current view: `(block_index - view) mod N`.
    pub primary_index: u16,
    /// Hash of the previous block.
    pub prev_hash: Hash,

    /// Proposal fields, copied from the accepted PrepareRequest (or filled
    /// by us when proposing).
    pub timestamp: u64,
    pub nonce: u64,
    pub next_consensus: Address,
    pub transaction_hashes: Vec<Hash>,

    /// Proposed transactions resolved so far, by hash.
    pub transactions: HashMap<Hash, Transaction>,
    /// Proposal hashes we could not resolve locally and asked peers for.
    pub missing_transactions: Vec<Hash>,

    /// Last PrepareRequest/PrepareResponse per validator, current view only.
    pub preparation_payloads: Vec<Option<ConsensusPayload>>,
    /// Last Commit per validator. Kept across view changes.
    pub commit_payloads: Vec<Option<ConsensusPayload>>,
    /// Last ChangeView per validator. Kept across view changes; the target
    /// view in a slot never decreases.
    pub change_view_payloads: Vec<Option<ConsensusPayload>>,
    /// Highest `(height, view)` seen from each validator this height.
    pub last_seen_message: Vec<Option<HeightView>>,

    pub(crate) key_pair: Option<KeyPair>,
    pub(crate) block: Option<Block>,
    pub(crate) last_block_index: u32,
    /// Timer clock at the moment the last block was accepted, for pacing.
    pub(crate) last_block_time_ms: u64,
    /// Timestamp of the last accepted block, for monotonic proposals.
    pub(crate) last_block_timestamp: u64,
    watch_only_override: bool,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            block_index: 0,
            view_number: 0,
            validators: Vec::new(),
            my_index: None,
            primary_index: 0,
            prev_hash: Hash::ZERO,
            timestamp: 0,
            nonce: 0,
            next_consensus: Address::ZERO,
            transaction_hashes: Vec::new(),
            transactions: HashMap::new(),
            missing_transactions: Vec::new(),
            preparation_payloads: Vec::new(),
            commit_payloads: Vec::new(),
            change_view_payloads: Vec::new(),
            last_seen_message: Vec::new(),
            key_pair: None,
            block: None,
            last_block_index: 0,
            last_block_time_ms: 0,
            last_block_timestamp: 0,
            watch_only_override: false,
        }
    }

    // Quorum arithmetic.

    /// Validator count.
    pub fn n(&self) -> usize {
        self.validators.len()
    }

    /// Maximum tolerated faults: `(N - 1) / 3`.
    pub fn f(&self) -> usize {
        (self.validators.len().saturating_sub(1)) / 3
    }

    /// Quorum size: `N - F`.
    pub fn m(&self) -> usize {
        self.validators.len() - self.f()
    }

    /// Primary of `view` at the current height.
    pub fn primary_index_for(&self, view: u8) -> u16 {
        let n = self.validators.len() as u32;
        if n == 0 {
            return 0;
        }
        (self.block_index.wrapping_sub(view as u32) % n) as u16
    }

    // Role predicates.

    pub fn is_primary(&self) -> bool {
        !self.watch_only() && self.my_index == Some(self.primary_index)
    }

    pub fn is_backup(&self) -> bool {
        !self.watch_only() && self.my_index.is_some() && self.my_index != Some(self.primary_index)
    }

    pub fn watch_only(&self) -> bool {
        self.my_index.is_none() || self.watch_only_override
    }

    // Progress predicates.

    /// The PrepareRequest slot for the current Primary is filled.
    pub fn request_sent_or_received(&self) -> bool {
        self.preparation_payloads
            .get(self.primary_index as usize)
            .is_some_and(Option::is_some)
    }

    /// Our own preparation slot is filled for this view.
    pub fn response_sent(&self) -> bool {
        !self.watch_only()
            && self
                .my_index
                .is_some_and(|i| self.preparation_payloads[i as usize].is_some())
    }

    /// Our own Commit slot is filled. Commits survive view changes, so this
    /// stays true after committing at an earlier view.
    pub fn commit_sent(&self) -> bool {
        !self.watch_only()
            && self
                .my_index
                .is_some_and(|i| self.commit_payloads[i as usize].is_some())
    }

    /// A block was finalized at this height.
    pub fn block_sent(&self) -> bool {
        self.block.is_some()
    }

    /// Our own ChangeView targets a view above the current one.
    pub fn view_changing(&self) -> bool {
        if self.watch_only() {
            return false;
        }
        let Some(my) = self.my_index else {
            return false;
        };
        match &self.change_view_payloads[my as usize] {
            Some(payload) => match &payload.message {
                Message::ChangeView(cv) => cv.new_view_number > self.view_number,
                _ => false,
            },
            None => false,
        }
    }

    /// View-changing and not yet past the committed-or-lost threshold.
    ///
    /// Once more than `F` validators are committed or unreachable, a view
    /// change can no longer gather a quorum of fresh validators, so late
    /// preparations must still be accepted to finalize at the current view.
    pub fn not_accepting_payloads_due_to_view_changing(&self) -> bool {
        self.view_changing() && !self.more_than_f_nodes_committed_or_lost()
    }

    /// Validators with a filled Commit slot.
    pub fn count_committed(&self) -> usize {
        self.commit_payloads.iter().filter(|p| p.is_some()).count()
    }

    /// Validators silent at this height.
    pub fn count_failed(&self) -> usize {
        self.last_seen_message
            .iter()
            .filter(|seen| match seen {
                None => true,
                Some(hv) => hv.height < self.block_index,
            })
            .count()
    }

    pub fn more_than_f_nodes_committed_or_lost(&self) -> bool {
        self.count_committed() + self.count_failed() > self.f()
    }

    /// Every proposed transaction is resolved.
    pub fn has_all_transactions(&self) -> bool {
        self.transaction_hashes
            .iter()
            .all(|h| self.transactions.contains_key(h))
    }

    /// Raise the watermark of the most recent message from a validator.
    pub(crate) fn update_last_seen(&mut self, index: u16, hv: HeightView) {
        if let Some(slot) = self.last_seen_message.get_mut(index as usize) {
            let newer = match slot {
                None => true,
                Some(prev) => (prev.height, prev.view) < (hv.height, hv.view),
            };
            if newer {
                *slot = Some(hv);
            }
        }
    }

    /// Header of the block under agreement, once the proposal is known.
    pub fn make_header(&self) -> Option<Header> {
        if !self.request_sent_or_received() {
            return None;
        }
        Some(Header {
            index: self.block_index,
            prev_hash: self.prev_hash,
            merkle_root: merkle_root(&self.transaction_hashes),
            timestamp: self.timestamp,
            nonce: self.nonce,
            next_consensus: self.next_consensus,
        })
    }

    /// Assemble the block from the stored proposal, transactions in proposal
    /// order. `None` until the proposal and all its transactions are known.
    pub fn create_block(&self) -> Option<Block> {
        let header = self.make_header()?;
        let transactions = self
            .transaction_hashes
            .iter()
            .map(|h| self.transactions.get(h).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Block {
            header,
            transactions,
            witness: Vec::new(),
        })
    }

    /// Full reset on entering a new height. The caller has already updated
    /// `block_index`, `prev_hash` and `validators` from the host.
    pub(crate) fn reset_for_height(&mut self, key: Option<(u16, KeyPair)>, watch_only: bool) {
        let n = self.validators.len();
        match key {
            Some((index, key_pair)) => {
                self.my_index = Some(index);
                self.key_pair = Some(key_pair);
            }
            None => {
                self.my_index = None;
                self.key_pair = None;
            }
        }
        self.watch_only_override = watch_only;
        self.view_number = 0;
        self.primary_index = self.primary_index_for(0);
        self.clear_proposal();
        self.preparation_payloads = vec![None; n];
        self.commit_payloads = vec![None; n];
        self.change_view_payloads = vec![None; n];
        self.last_seen_message = vec![None; n];
        self.block = None;
    }

    /// Partial reset on advancing to `view` within the same height.
    pub(crate) fn reset_for_view(&mut self, view: u8) {
        let n = self.validators.len();
        self.view_number = view;
        self.primary_index = self.primary_index_for(view);
        self.clear_proposal();
        self.preparation_payloads = vec![None; n];
        self.block = None;
    }

    fn clear_proposal(&mut self) {
        self.timestamp = 0;
        self.nonce = 0;
        self.next_consensus = Address::ZERO;
        self.transaction_hashes.clear();
        self.transactions.clear();
        self.missing_transactions.clear();
    }
}
