//! The consensus state machine.

use std::time::Duration;

use dbft_payloads::{ChangeViewReason, ConsensusPayload, Message};
use dbft_types::{Hash, Transaction};
use tracing::{debug, error, info, warn};

use crate::cache::{MessageCache, CACHE_HORIZON};
use crate::timer::HeightView;
use crate::{Config, ConfigError, Context, Host, Timer};

/// Cap on the exponent of the view-timeout ladder, so a runaway view number
/// cannot overflow the interval arithmetic.
pub(crate) const MAX_TIMEOUT_SHIFT: u32 = 16;

/// `interval << exponent`, capped.
pub(crate) fn scaled_interval(interval: Duration, exponent: u32) -> Duration {
    interval.saturating_mul(1u32 << exponent.min(MAX_TIMEOUT_SHIFT))
}

/// The dBFT consensus engine.
///
/// Owns the per-height [`Context`], the early-message cache and the injected
/// [`Timer`]; talks to the node through the [`Host`] trait. See the crate
/// docs for the entrypoint contract.
pub struct Dbft<H: Host> {
    pub(crate) config: Config,
    pub(crate) host: H,
    pub(crate) timer: Box<dyn Timer>,
    pub(crate) context: Context,
    cache: MessageCache,
    /// Set while a RecoveryMessage is being applied; suppresses recovery
    /// replies that would echo and keeps a Primary on the backup timeout
    /// ladder when a height begins mid-recovery.
    pub(crate) recovering: bool,
}

impl<H: Host> Dbft<H> {
    /// Build an engine. Fails only on fatal configuration problems; once
    /// running, the engine never returns errors to the caller.
    pub fn new(config: Config, mut host: H, timer: Box<dyn Timer>) -> Result<Self, ConfigError> {
        if config.block_interval.is_zero() {
            return Err(ConfigError::ZeroBlockInterval);
        }
        let next_height = host.current_height() + 1;
        if host.validators(next_height).is_empty() {
            return Err(ConfigError::NoValidators {
                height: next_height,
            });
        }
        let mut context = Context::new();
        // Treat startup as the last block's arrival for pacing purposes.
        context.last_block_time_ms = timer.now_ms();
        Ok(Self {
            config,
            host,
            timer,
            context,
            cache: MessageCache::new(),
            recovering: false,
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Begin consensus at the height after the host's current one.
    pub fn start(&mut self) {
        self.initialize_consensus(0);
    }

    /// Ask peers for a recovery bundle. Hosts call this after a restart
    /// that may have landed mid-height.
    pub fn request_recovery(&mut self) {
        if self.context.watch_only() {
            return;
        }
        self.send_recovery_request();
    }

    /// A consensus payload arrived from the network (or from cache replay).
    pub fn on_receive(&mut self, payload: ConsensusPayload) {
        if payload.validator_index as usize >= self.context.validators.len() {
            warn!(
                from = payload.validator_index,
                validators = self.context.validators.len(),
                "validator index out of range"
            );
            return;
        }

        debug!(
            message = %payload.message_type(),
            from = payload.validator_index,
            height = payload.height,
            view = payload.view,
            my_height = self.context.block_index,
            my_view = self.context.view_number,
            "received message"
        );

        if payload.height < self.context.block_index {
            debug!(height = payload.height, "ignoring message from old height");
            return;
        }
        let next_view = self.context.view_number.wrapping_add(1);
        if payload.height > self.context.block_index
            || (payload.view == next_view
                && payload.message_type() != dbft_payloads::MessageType::RecoveryMessage)
        {
            if payload.height > self.context.block_index.saturating_add(CACHE_HORIZON) {
                debug!(height = payload.height, "dropping message beyond cache horizon");
                return;
            }
            debug!(
                height = payload.height,
                view = payload.view,
                "caching message from the future"
            );
            self.cache.add(payload);
            return;
        }

        self.context.update_last_seen(
            payload.validator_index,
            HeightView {
                height: payload.height,
                view: payload.view,
            },
        );

        match &payload.message {
            Message::ChangeView(_) => self.on_change_view(payload),
            Message::PrepareRequest(_) => self.on_prepare_request(payload),
            Message::PrepareResponse(_) => self.on_prepare_response(payload),
            Message::Commit(_) => self.on_commit(payload),
            Message::RecoveryRequest(_) => self.on_recovery_request(payload),
            Message::RecoveryMessage(_) => self.on_recovery_message(payload),
        }
    }

    /// A transaction arrived from the network or mempool.
    pub fn on_transaction(&mut self, tx: Transaction) {
        if !self.context.is_backup()
            || self.context.not_accepting_payloads_due_to_view_changing()
            || !self.context.request_sent_or_received()
            || self.context.response_sent()
            || self.context.block_sent()
            || self.context.missing_transactions.is_empty()
        {
            return;
        }
        let hash = tx.hash();
        if let Some(position) = self
            .context
            .missing_transactions
            .iter()
            .position(|missing| *missing == hash)
        {
            self.context.missing_transactions.swap_remove(position);
            self.add_transaction(tx);
        }
    }

    /// The timer fired for `hv`.
    pub fn on_timeout(&mut self, hv: HeightView) {
        if self.context.watch_only() {
            return;
        }
        if hv.height != self.context.block_index || hv.view != self.context.view_number {
            debug!(height = hv.height, view = hv.view, "ignoring stale timer");
            return;
        }

        debug!(height = hv.height, view = hv.view, "timeout");

        if self.context.is_primary() && !self.context.request_sent_or_received() {
            self.send_prepare_request();
        } else if (self.context.is_primary() && self.context.request_sent_or_received())
            || self.context.is_backup()
        {
            if self.context.commit_sent() {
                debug!("resending commit state via recovery");
                self.send_recovery_message();
                self.change_timer(scaled_interval(self.config.block_interval, 1));
            } else {
                self.send_change_view(ChangeViewReason::Timeout);
            }
        }
    }

    /// Reset state for `(current height, view)` and arm the timer. Called
    /// at startup and after every height or view transition.
    pub(crate) fn initialize_consensus(&mut self, view: u8) {
        self.reset_context(view);

        let role = if self.context.is_primary() {
            "Primary"
        } else if self.context.watch_only() {
            "WatchOnly"
        } else {
            "Backup"
        };
        info!(
            height = self.context.block_index,
            view,
            index = ?self.context.my_index,
            role,
            "initializing consensus"
        );

        if !self.context.watch_only() {
            let mut timeout = if self.context.is_primary() && !self.recovering {
                if view == 0 {
                    // Fresh height: pace the proposal a full interval after
                    // the previous block.
                    self.config.block_interval
                } else {
                    Duration::ZERO
                }
            } else {
                scaled_interval(self.config.block_interval, view as u32 + 1)
            };
            if self.context.last_block_index + 1 == self.context.block_index {
                let elapsed = self
                    .timer
                    .now_ms()
                    .saturating_sub(self.context.last_block_time_ms);
                timeout = timeout.saturating_sub(Duration::from_millis(elapsed));
            }
            self.change_timer(timeout);
        }

        // Replay anything that arrived early for this height. The Primary
        // skips replay; it drives the view with its own proposal.
        if !self.context.is_primary() {
            if let Some(bucket) = self.cache.take(self.context.block_index) {
                for payload in bucket.prepare {
                    self.on_receive(payload);
                }
                for payload in bucket.change_views {
                    self.on_receive(payload);
                }
                for payload in bucket.commit {
                    self.on_receive(payload);
                }
            }
        }
        if view == 0 {
            self.cache.purge_below(self.context.block_index);
        }
    }

    fn reset_context(&mut self, view: u8) {
        if view == 0 {
            let height = self.host.current_height();
            self.context.block_index = height + 1;
            self.context.prev_hash = self.host.current_block_hash();
            let validators = self.host.validators(self.context.block_index);
            if validators.is_empty() {
                // Keep the previous set rather than dividing by zero; the
                // host contract says this must not happen.
                error!(
                    height = self.context.block_index,
                    "host returned no validators, keeping previous set"
                );
            } else {
                self.context.validators = validators;
            }
            let key = self.host.key_pair(&self.context.validators);
            let watch_only = self.host.watch_only();
            self.context.reset_for_height(key, watch_only);
        } else {
            self.context.reset_for_view(view);
        }
    }

    fn on_prepare_request(&mut self, payload: ConsensusPayload) {
        if self.context.request_sent_or_received() {
            debug!("ignoring duplicate PrepareRequest");
            return;
        }
        if payload.view != self.context.view_number {
            debug!(view = payload.view, "ignoring PrepareRequest for wrong view");
            return;
        }
        if payload.validator_index != self.context.primary_index {
            debug!(
                from = payload.validator_index,
                primary = self.context.primary_index,
                "ignoring PrepareRequest from non-primary"
            );
            return;
        }
        let Message::PrepareRequest(request) = &payload.message else {
            return;
        };
        let request = request.clone();

        if let Err(err) = self.host.verify_prepare_request(&payload) {
            // A signed but invalid proposal from the right Primary: give up
            // on this view.
            warn!(from = payload.validator_index, error = %err, "invalid PrepareRequest");
            self.send_change_view(ChangeViewReason::BlockRejectedByPolicy);
            return;
        }

        self.extend_timer(2);

        if request.transaction_hashes.is_empty() {
            debug!("received empty PrepareRequest");
        }
        self.context.timestamp = request.timestamp;
        self.context.nonce = request.nonce;
        self.context.next_consensus = request.next_consensus;
        self.context.transaction_hashes = request.transaction_hashes;

        info!(
            validator = payload.validator_index,
            tx_count = self.context.transaction_hashes.len(),
            "received PrepareRequest"
        );

        self.process_missing_transactions();

        let request_hash = payload.hash();
        let index = payload.validator_index as usize;
        self.context.preparation_payloads[index] = Some(payload);
        self.update_existing_payloads(request_hash);

        if !self.context.has_all_transactions()
            || !self.create_and_check_block()
            || self.context.watch_only()
        {
            return;
        }
        self.send_prepare_response();
        self.check_prepare();
    }

    /// Resolve proposed transactions from the mempool and ask the network
    /// for the rest.
    fn process_missing_transactions(&mut self) {
        let mut missing = Vec::new();
        for hash in &self.context.transaction_hashes {
            if self.context.transactions.contains_key(hash) {
                continue;
            }
            match self.host.transaction(hash) {
                Some(tx) => {
                    self.context.transactions.insert(*hash, tx);
                }
                None => missing.push(*hash),
            }
        }
        if !missing.is_empty() {
            info!(count = missing.len(), "missing transactions");
            self.host.request_transactions(&missing);
            self.context.missing_transactions = missing;
        }
    }

    /// Validate the proposed block against chain policy. On failure asks
    /// for a view change and returns false. Only meaningful once all
    /// transactions are collected.
    pub(crate) fn create_and_check_block(&mut self) -> bool {
        let next_validators = self.host.validators(self.context.block_index + 1);
        let expected = self.host.consensus_address(&next_validators);
        if self.context.next_consensus != expected {
            error!(
                proposed = %self.context.next_consensus,
                expected = %expected,
                "invalid next_consensus in proposed block"
            );
            self.send_change_view(ChangeViewReason::BlockRejectedByPolicy);
            return false;
        }
        let Some(block) = self.host.new_block_from_context(&self.context) else {
            warn!("could not assemble proposed block");
            return false;
        };
        if !self.host.verify_block(&block) {
            warn!("proposed block fails verification");
            self.send_change_view(ChangeViewReason::TxInvalid);
            return false;
        }
        true
    }

    /// Reconcile previously stored payloads with a just-arrived
    /// PrepareRequest: responses that endorse a different proposal are
    /// dropped, and commits held before the header was known are verified
    /// now that it is.
    fn update_existing_payloads(&mut self, request_hash: Hash) {
        for slot in self.context.preparation_payloads.iter_mut() {
            if let Some(stored) = slot {
                if let Message::PrepareResponse(response) = &stored.message {
                    if response.preparation_hash != request_hash {
                        *slot = None;
                    }
                }
            }
        }

        let Some(header) = self.context.make_header() else {
            return;
        };
        let view = self.context.view_number;
        let context = &mut self.context;
        for (index, slot) in context.commit_payloads.iter_mut().enumerate() {
            let Some(stored) = slot else { continue };
            if stored.view != view {
                continue;
            }
            if let Message::Commit(commit) = &stored.message {
                if !header.verify(&context.validators[index], &commit.signature) {
                    warn!(validator = index, "dropping commit with invalid signature");
                    *slot = None;
                }
            }
        }
    }

    fn on_prepare_response(&mut self, payload: ConsensusPayload) {
        if payload.view != self.context.view_number {
            debug!(view = payload.view, "ignoring PrepareResponse for wrong view");
            return;
        }
        if payload.validator_index == self.context.primary_index {
            debug!(
                from = payload.validator_index,
                "ignoring PrepareResponse from primary"
            );
            return;
        }
        let index = payload.validator_index as usize;
        if self.context.preparation_payloads[index].is_some()
            || self.context.not_accepting_payloads_due_to_view_changing()
        {
            debug!("ignoring PrepareResponse during view change");
            return;
        }
        if let Err(err) = self.host.verify_prepare_response(&payload) {
            warn!(from = payload.validator_index, error = %err, "invalid PrepareResponse");
            return;
        }
        let Message::PrepareResponse(response) = &payload.message else {
            return;
        };
        let response_hash = response.preparation_hash;

        info!(validator = payload.validator_index, "received PrepareResponse");
        let request_hash = self.context.preparation_payloads[self.context.primary_index as usize]
            .as_ref()
            .map(ConsensusPayload::hash);
        self.context.preparation_payloads[index] = Some(payload);

        if let Some(request_hash) = request_hash {
            if response_hash != request_hash {
                self.context.preparation_payloads[index] = None;
                debug!(
                    expected = %request_hash,
                    received = %response_hash,
                    "preparation hash mismatch"
                );
                return;
            }
        }

        self.extend_timer(2);

        if !self.context.watch_only()
            && !self.context.commit_sent()
            && self.context.request_sent_or_received()
        {
            self.check_prepare();
        }
    }

    fn on_commit(&mut self, payload: ConsensusPayload) {
        let Message::Commit(commit) = &payload.message else {
            return;
        };
        let index = payload.validator_index as usize;

        if payload.view == self.context.view_number {
            self.extend_timer(4);
            match self.context.make_header() {
                Some(header) => {
                    if header.verify(&self.context.validators[index], &commit.signature) {
                        info!(validator = index, "received Commit");
                        self.context.commit_payloads[index] = Some(payload);
                        self.check_commit();
                    } else {
                        warn!(validator = index, "invalid commit signature");
                    }
                }
                None => {
                    // Header unknown yet; hold the commit and verify it when
                    // the PrepareRequest arrives.
                    self.context.commit_payloads[index] = Some(payload);
                }
            }
            return;
        }

        info!(
            validator = index,
            view = payload.view,
            "received Commit for another view"
        );
        // Keep it for recovery and possible finalization at that view, but
        // never displace a commit already verified for the current view.
        let holds_current_view = self.context.commit_payloads[index]
            .as_ref()
            .is_some_and(|stored| stored.view == self.context.view_number);
        if !holds_current_view {
            self.context.commit_payloads[index] = Some(payload);
        }
    }

    fn on_change_view(&mut self, payload: ConsensusPayload) {
        let Message::ChangeView(change_view) = &payload.message else {
            return;
        };
        let new_view = change_view.new_view_number;
        let reason = change_view.reason;

        if new_view <= self.context.view_number {
            debug!(
                from = payload.validator_index,
                new_view, "stale ChangeView, treating as recovery request"
            );
            self.answer_recovery_request(payload.validator_index);
            return;
        }
        if self.context.commit_sent() {
            // Committed nodes never abandon their view; help the requester
            // converge instead.
            debug!("ignoring ChangeView after commit");
            self.send_recovery_message();
            return;
        }

        let index = payload.validator_index as usize;
        if let Some(existing) = &self.context.change_view_payloads[index] {
            if let Message::ChangeView(previous) = &existing.message {
                if new_view < previous.new_view_number {
                    return;
                }
            }
        }

        info!(
            validator = payload.validator_index,
            reason = %reason,
            new_view,
            "received ChangeView"
        );
        self.context.change_view_payloads[index] = Some(payload);
        self.check_change_view(new_view);
    }

    fn on_recovery_request(&mut self, payload: ConsensusPayload) {
        debug!(from = payload.validator_index, "received RecoveryRequest");
        self.answer_recovery_request(payload.validator_index);
    }

    /// Answer a recovery request if we are eligible. Committed nodes always
    /// answer; otherwise only the `F` validators following the requester
    /// do, so each request draws at most `F + 1` replies.
    fn answer_recovery_request(&mut self, from: u16) {
        if !self.context.commit_sent() {
            let Some(my_index) = self.context.my_index else {
                return;
            };
            let n = self.context.n();
            let eligible = (1..=self.context.f())
                .any(|offset| (from as usize + offset) % n == my_index as usize);
            if !eligible {
                return;
            }
        }
        self.send_recovery_message();
    }

    fn on_recovery_message(&mut self, payload: ConsensusPayload) {
        let Message::RecoveryMessage(recovery) = payload.message.clone() else {
            return;
        };
        debug!(
            from = payload.validator_index,
            view = payload.view,
            "received RecoveryMessage"
        );

        self.recovering = true;

        if payload.view > self.context.view_number {
            if self.context.commit_sent() {
                self.recovering = false;
                return;
            }
            for message in recovery.change_views(&payload) {
                self.on_receive(message);
            }
        }

        // The change views above may have advanced us to the sender's view.
        if payload.view == self.context.view_number
            && !self.context.not_accepting_payloads_due_to_view_changing()
            && !self.context.commit_sent()
        {
            if !self.context.request_sent_or_received() {
                match recovery.prepare_request(&payload, self.context.primary_index) {
                    Some(request) => self.on_receive(request),
                    None if self.context.is_primary() => self.send_prepare_request(),
                    None => {}
                }
            }
            for message in recovery.prepare_responses(&payload, self.context.primary_index) {
                self.on_receive(message);
            }
        }

        if payload.view <= self.context.view_number {
            // Commits from lower views can still finalize a block there.
            for message in recovery.commits(&payload) {
                self.on_receive(message);
            }
        }

        debug!("recovery processing finished");
        self.recovering = false;
    }

    pub(crate) fn add_transaction(&mut self, tx: Transaction) {
        self.context.transactions.insert(tx.hash(), tx);
        if !self.context.has_all_transactions() {
            return;
        }
        if self.context.is_primary() || self.context.watch_only() {
            return;
        }
        if !self.create_and_check_block() {
            return;
        }
        self.extend_timer(2);
        self.send_prepare_response();
        self.check_prepare();
    }
}
