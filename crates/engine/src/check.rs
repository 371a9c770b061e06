//! Quorum checks: the transitions out of each protocol phase.

use dbft_payloads::{ChangeViewReason, Message};
use dbft_types::CommitWitness;
use tracing::{debug, info};

use crate::{Dbft, Host};

impl<H: Host> Dbft<H> {
    /// Commit once a preparation quorum exists for the current view.
    pub(crate) fn check_prepare(&mut self) {
        if !self.context.has_all_transactions() {
            debug!(
                missing = self.context.missing_transactions.len(),
                "check prepare: transactions still missing"
            );
            return;
        }
        if self.context.watch_only()
            || self.context.commit_sent()
            || !self.context.request_sent_or_received()
        {
            return;
        }

        let mut count = 0;
        let mut has_request = false;
        for payload in self.context.preparation_payloads.iter().flatten() {
            if payload.view == self.context.view_number {
                count += 1;
            }
            if matches!(payload.message, Message::PrepareRequest(_)) {
                has_request = true;
            }
        }

        debug!(
            count,
            quorum = self.context.m(),
            has_request,
            "checking preparations"
        );

        if has_request && count >= self.context.m() {
            self.send_commit();
            self.change_timer(self.config.block_interval);
            self.check_commit();
        }
    }

    /// Finalize once a commit quorum exists for the current view.
    pub(crate) fn check_commit(&mut self) {
        if !self.context.has_all_transactions() {
            debug!(
                missing = self.context.missing_transactions.len(),
                "check commit: transactions still missing"
            );
            return;
        }

        let count = self
            .context
            .commit_payloads
            .iter()
            .flatten()
            .filter(|payload| payload.view == self.context.view_number)
            .count();
        if count < self.context.m() {
            debug!(count, quorum = self.context.m(), "not enough commits");
            return;
        }

        self.context.last_block_index = self.context.block_index;
        self.context.last_block_time_ms = self.timer.now_ms();

        let Some(mut block) = self.host.new_block_from_context(&self.context) else {
            debug!("commit quorum reached but block not assemblable");
            return;
        };
        block.witness = self
            .context
            .commit_payloads
            .iter()
            .flatten()
            .filter(|payload| payload.view == self.context.view_number)
            .filter_map(|payload| match &payload.message {
                Message::Commit(commit) => Some(CommitWitness {
                    validator_index: payload.validator_index,
                    signature: commit.signature,
                }),
                _ => None,
            })
            .collect();
        self.context.last_block_timestamp = block.header.timestamp;

        let hash = block.hash();
        info!(
            height = self.context.block_index,
            view = self.context.view_number,
            %hash,
            tx_count = block.transactions.len(),
            prev = %block.header.prev_hash,
            next_consensus = %block.header.next_consensus,
            "approving block"
        );

        self.context.block = Some(block.clone());
        self.host.process_block(&block);

        self.initialize_consensus(0);
    }

    /// Move to `view` once a quorum asks for it (or higher).
    pub(crate) fn check_change_view(&mut self, view: u8) {
        if self.context.view_number >= view {
            return;
        }

        let count = self
            .context
            .change_view_payloads
            .iter()
            .flatten()
            .filter(|payload| match &payload.message {
                Message::ChangeView(cv) => cv.new_view_number >= view,
                _ => false,
            })
            .count();
        if count < self.context.m() {
            return;
        }

        if !self.context.watch_only() {
            // Join the agreement if our own request lags the accepted view.
            let own_target = self
                .context
                .my_index
                .and_then(|i| self.context.change_view_payloads[i as usize].as_ref())
                .and_then(|payload| match &payload.message {
                    Message::ChangeView(cv) => Some(cv.new_view_number),
                    _ => None,
                });
            if own_target.map_or(true, |target| target < view) {
                self.broadcast_change_view(view, ChangeViewReason::ChangeAgreement);
            }
        }

        self.initialize_consensus(view);
    }
}
