//! Outbound payload construction and timer control.

use std::time::Duration;

use dbft_payloads::{
    ChangeView, ChangeViewReason, Commit, ConsensusPayload, Message, PrepareRequest,
    PrepareResponse, RecoveryMessage, RecoveryRequest,
};
use dbft_types::{Hash, Transaction};
use tracing::{debug, info};

use crate::dbft::scaled_interval;
use crate::timer::HeightView;
use crate::{Dbft, Host};

/// Deterministic proposal nonce: derived from chain state and the proposal
/// timestamp so identical timer behaviour yields identical proposals.
fn proposal_nonce(prev_hash: &Hash, timestamp: u64) -> u64 {
    let mut data = [0u8; 40];
    data[..32].copy_from_slice(prev_hash.as_bytes());
    data[32..].copy_from_slice(&timestamp.to_le_bytes());
    let digest = Hash::digest(&data);
    let bytes = digest.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

impl<H: Host> Dbft<H> {
    /// Wrap a message in an envelope attributed to us. `None` for
    /// spectators.
    fn make_payload(&self, message: Message) -> Option<ConsensusPayload> {
        let my_index = self.context.my_index?;
        Some(ConsensusPayload::new(
            my_index,
            self.context.block_index,
            self.context.view_number,
            message,
        ))
    }

    fn broadcast(&mut self, payload: ConsensusPayload) {
        debug!(
            message = %payload.message_type(),
            height = payload.height,
            view = payload.view,
            "broadcasting"
        );
        self.context.update_last_seen(
            payload.validator_index,
            HeightView {
                height: payload.height,
                view: payload.view,
            },
        );
        self.host.broadcast(payload);
    }

    /// Propose the next block. Primary only.
    pub(crate) fn send_prepare_request(&mut self) {
        if self.context.watch_only() || self.context.request_sent_or_received() {
            return;
        }

        let mut transactions = self.host.verified_transactions();
        transactions.truncate(dbft_payloads::MAX_TRANSACTIONS_PER_BLOCK);
        let now = self.timer.now_ms();
        self.context.timestamp = now.max(
            self.context
                .last_block_timestamp
                .saturating_add(self.config.timestamp_increment),
        );
        self.context.nonce = proposal_nonce(&self.context.prev_hash, self.context.timestamp);
        self.context.transaction_hashes =
            transactions.iter().map(Transaction::hash).collect();
        self.context.transactions = transactions
            .into_iter()
            .map(|tx| (tx.hash(), tx))
            .collect();
        self.context.missing_transactions.clear();
        let next_validators = self.host.validators(self.context.block_index + 1);
        self.context.next_consensus = self.host.consensus_address(&next_validators);

        let request = PrepareRequest {
            timestamp: self.context.timestamp,
            nonce: self.context.nonce,
            next_consensus: self.context.next_consensus,
            transaction_hashes: self.context.transaction_hashes.clone(),
        };
        let Some(payload) = self.make_payload(Message::PrepareRequest(request)) else {
            return;
        };

        if self.context.transaction_hashes.is_empty() {
            debug!("proposing empty block");
        }
        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            tx_count = self.context.transaction_hashes.len(),
            "sending PrepareRequest"
        );

        let index = payload.validator_index as usize;
        self.context.preparation_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
        self.change_timer(scaled_interval(
            self.config.block_interval,
            self.context.view_number as u32 + 1,
        ));
        // A single-validator network has its quorum already.
        self.check_prepare();
    }

    /// Endorse the Primary's proposal.
    pub(crate) fn send_prepare_response(&mut self) {
        if self.context.watch_only() || self.context.response_sent() {
            return;
        }
        let Some(request) =
            &self.context.preparation_payloads[self.context.primary_index as usize]
        else {
            return;
        };
        let preparation_hash = request.hash();
        let Some(payload) = self.make_payload(Message::PrepareResponse(PrepareResponse {
            preparation_hash,
        })) else {
            return;
        };

        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            "sending PrepareResponse"
        );
        let index = payload.validator_index as usize;
        self.context.preparation_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
    }

    /// Sign the header and commit to it.
    pub(crate) fn send_commit(&mut self) {
        if self.context.watch_only() || self.context.commit_sent() {
            return;
        }
        let Some(header) = self.context.make_header() else {
            return;
        };
        let Some(key) = self.context.key_pair.clone() else {
            return;
        };
        let signature = header.sign(&key);
        let Some(payload) = self.make_payload(Message::Commit(Commit { signature })) else {
            return;
        };

        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            "sending Commit"
        );
        let index = payload.validator_index as usize;
        self.context.commit_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
    }

    /// Ask to abandon the current view for the next one.
    pub(crate) fn send_change_view(&mut self, reason: ChangeViewReason) {
        // A committed node never walks away from its view.
        if self.context.watch_only() || self.context.commit_sent() || self.context.block_sent() {
            return;
        }
        let new_view = self.context.view_number.wrapping_add(1);
        self.broadcast_change_view(new_view, reason);
        self.change_timer(scaled_interval(
            self.config.block_interval,
            new_view as u32 + 1,
        ));
        self.check_change_view(new_view);
    }

    /// Broadcast a ChangeView targeting `new_view` and record it in our own
    /// slot.
    pub(crate) fn broadcast_change_view(&mut self, new_view: u8, reason: ChangeViewReason) {
        let change_view = ChangeView {
            new_view_number: new_view,
            timestamp: self.timer.now_ms(),
            reason,
        };
        let Some(payload) = self.make_payload(Message::ChangeView(change_view)) else {
            return;
        };

        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            new_view,
            reason = %reason,
            "requesting view change"
        );
        let index = payload.validator_index as usize;
        self.context.change_view_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
    }

    /// Solicit recovery bundles from peers.
    pub(crate) fn send_recovery_request(&mut self) {
        if self.context.watch_only() || self.recovering {
            return;
        }
        let Some(payload) = self.make_payload(Message::RecoveryRequest(RecoveryRequest {
            timestamp: self.timer.now_ms(),
        })) else {
            return;
        };
        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            "requesting recovery"
        );
        self.broadcast(payload);
    }

    /// Bundle everything we hold for this height into a RecoveryMessage.
    pub(crate) fn send_recovery_message(&mut self) {
        if self.context.watch_only() || self.recovering {
            return;
        }

        let mut recovery = RecoveryMessage::new();
        for payload in self.context.change_view_payloads.iter().flatten() {
            recovery.add_payload(payload);
        }
        let mut response_digest = None;
        for payload in self.context.preparation_payloads.iter().flatten() {
            recovery.add_payload(payload);
            if response_digest.is_none() {
                if let Message::PrepareResponse(response) = &payload.message {
                    response_digest = Some(response.preparation_hash);
                }
            }
        }
        // When only responses were seen, carry the proposal hash they
        // endorse so receivers can rebuild them.
        if let Some(digest) = response_digest {
            recovery.set_preparation_digest(digest);
        }
        for payload in self.context.commit_payloads.iter().flatten() {
            recovery.add_payload(payload);
        }

        let Some(payload) = self.make_payload(Message::RecoveryMessage(recovery)) else {
            return;
        };
        debug!(
            height = self.context.block_index,
            view = self.context.view_number,
            "sending RecoveryMessage"
        );
        self.broadcast(payload);
    }

    pub(crate) fn change_timer(&mut self, delay: Duration) {
        debug!(
            height = self.context.block_index,
            view = self.context.view_number,
            ?delay,
            "resetting timer"
        );
        self.timer.reset(
            HeightView {
                height: self.context.block_index,
                view: self.context.view_number,
            },
            delay,
        );
    }

    /// Push the pending timeout out on protocol progress. Suppressed once
    /// we are committed or asking for a view change.
    pub(crate) fn extend_timer(&mut self, factor: u32) {
        if !self.context.commit_sent() && !self.context.view_changing() {
            let quorum = self.context.m().max(1) as u32;
            self.timer
                .extend(self.config.block_interval * factor / quorum);
        }
    }
}
