//! Buffer for payloads that arrived early.
//!
//! Messages for a future height (or the next view at the current height)
//! are parked here and replayed when the engine reaches them. Bounded in
//! two directions: heights beyond the horizon are rejected by the engine
//! before they get here, heights the engine has passed are purged.

use std::collections::BTreeMap;

use dbft_payloads::{ConsensusPayload, MessageType};

/// How many heights ahead of the current one the engine will buffer for.
pub(crate) const CACHE_HORIZON: u32 = 8;

/// Cap on payloads per bucket vector, so a flood of garbage for one future
/// height cannot grow memory without bound.
const MAX_BUCKET_MESSAGES: usize = 256;

/// Early messages for one height, grouped the way replay wants them.
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    pub prepare: Vec<ConsensusPayload>,
    pub change_views: Vec<ConsensusPayload>,
    pub commit: Vec<ConsensusPayload>,
}

#[derive(Debug, Default)]
pub(crate) struct MessageCache {
    mail: BTreeMap<u32, Bucket>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a payload under its height. Recovery payloads are not cached:
    /// they describe state that will be stale by the time we catch up.
    pub fn add(&mut self, payload: ConsensusPayload) {
        let bucket = self.mail.entry(payload.height).or_default();
        let queue = match payload.message_type() {
            MessageType::PrepareRequest | MessageType::PrepareResponse => &mut bucket.prepare,
            MessageType::ChangeView => &mut bucket.change_views,
            MessageType::Commit => &mut bucket.commit,
            MessageType::RecoveryRequest | MessageType::RecoveryMessage => return,
        };
        if queue.len() < MAX_BUCKET_MESSAGES {
            queue.push(payload);
        }
    }

    /// Remove and return the bucket for `height`.
    pub fn take(&mut self, height: u32) -> Option<Bucket> {
        self.mail.remove(&height)
    }

    /// Drop every bucket below `height`.
    pub fn purge_below(&mut self, height: u32) {
        self.mail = self.mail.split_off(&height);
    }
}
