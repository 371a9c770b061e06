//! Recovery payloads: the request and the compact state bundle.

use dbft_types::{Hash, Signature};
use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

use crate::{
    ChangeView, ChangeViewReason, Commit, ConsensusPayload, Message, PrepareRequest,
    PrepareResponse,
};

/// Upper bound on entries in each recovery array. Far above any real
/// validator set; exists to bound allocation on hostile input.
const MAX_RECOVERY_ENTRIES: u64 = 1024;

/// Solicits a [`RecoveryMessage`] from peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryRequest {
    /// Sender's clock, milliseconds.
    pub timestamp: u64,
}

impl Encode for RecoveryRequest {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u64(self.timestamp);
    }
}

impl Decode for RecoveryRequest {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            timestamp: r.read_u64()?,
        })
    }
}

/// Compact record of a ChangeView the sender holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeViewCompact {
    pub validator_index: u16,
    /// The view the ChangeView was issued at; it targeted `original + 1`.
    pub original_view_number: u8,
    pub timestamp: u64,
}

impl Encode for ChangeViewCompact {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u16(self.validator_index);
        w.write_u8(self.original_view_number);
        w.write_u64(self.timestamp);
    }
}

impl Decode for ChangeViewCompact {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            validator_index: r.read_u16()?,
            original_view_number: r.read_u8()?,
            timestamp: r.read_u64()?,
        })
    }
}

/// Compact record of a PrepareResponse the sender holds. The endorsed hash
/// is shared across all stubs via [`PreparationProof`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparationCompact {
    pub validator_index: u16,
}

impl Encode for PreparationCompact {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u16(self.validator_index);
    }
}

impl Decode for PreparationCompact {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            validator_index: r.read_u16()?,
        })
    }
}

/// Compact record of a Commit the sender holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitCompact {
    /// The view the Commit was issued at. Commits survive view changes, so
    /// this may differ from the recovery payload's view.
    pub view_number: u8,
    pub validator_index: u16,
    pub signature: Signature,
}

impl Encode for CommitCompact {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u8(self.view_number);
        w.write_u16(self.validator_index);
        self.signature.encode(w);
    }
}

impl Decode for CommitCompact {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            view_number: r.read_u8()?,
            validator_index: r.read_u16()?,
            signature: Signature::decode(r)?,
        })
    }
}

/// What the recovery sender knows about the current proposal.
///
/// Exactly one of three states: the full PrepareRequest (the sender saw the
/// proposal), just its payload hash (the sender only saw PrepareResponses),
/// or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparationProof {
    Request(PrepareRequest),
    Digest(Hash),
    Absent,
}

/// Compact bundle rebuilding the sender's view of the current height.
///
/// Receivers expand the stubs back into full payloads and feed them through
/// the normal receive path, so all validation applies to recovered state as
/// well.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryMessage {
    pub change_views: Vec<ChangeViewCompact>,
    pub preparation: PreparationProof,
    pub preparations: Vec<PreparationCompact>,
    pub commits: Vec<CommitCompact>,
}

impl Default for PreparationProof {
    fn default() -> Self {
        Self::Absent
    }
}

impl RecoveryMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one of the sender's stored payloads in compact form.
    pub fn add_payload(&mut self, payload: &ConsensusPayload) {
        match &payload.message {
            Message::PrepareRequest(req) => {
                self.preparation = PreparationProof::Request(req.clone());
            }
            Message::PrepareResponse(_) => {
                self.preparations.push(PreparationCompact {
                    validator_index: payload.validator_index,
                });
            }
            Message::ChangeView(cv) => {
                self.change_views.push(ChangeViewCompact {
                    validator_index: payload.validator_index,
                    original_view_number: payload.view,
                    timestamp: cv.timestamp,
                });
            }
            Message::Commit(commit) => {
                self.commits.push(CommitCompact {
                    view_number: payload.view,
                    validator_index: payload.validator_index,
                    signature: commit.signature,
                });
            }
            Message::RecoveryRequest(_) | Message::RecoveryMessage(_) => {}
        }
    }

    /// Record the proposal hash when only PrepareResponses were seen.
    pub fn set_preparation_digest(&mut self, hash: Hash) {
        if !matches!(self.preparation, PreparationProof::Request(_)) {
            self.preparation = PreparationProof::Digest(hash);
        }
    }

    /// Rebuild the PrepareRequest payload, attributed to `primary`.
    ///
    /// The reconstructed envelope is byte-identical to the one the Primary
    /// broadcast, so its hash matches the PrepareResponses.
    pub fn prepare_request(
        &self,
        recovery: &ConsensusPayload,
        primary: u16,
    ) -> Option<ConsensusPayload> {
        let PreparationProof::Request(req) = &self.preparation else {
            return None;
        };
        Some(ConsensusPayload::new(
            primary,
            recovery.height,
            recovery.view,
            Message::PrepareRequest(req.clone()),
        ))
    }

    /// The hash PrepareResponses endorse, if known.
    pub fn preparation_digest(&self, recovery: &ConsensusPayload, primary: u16) -> Option<Hash> {
        match &self.preparation {
            PreparationProof::Request(_) => {
                self.prepare_request(recovery, primary).map(|p| p.hash())
            }
            PreparationProof::Digest(hash) => Some(*hash),
            PreparationProof::Absent => None,
        }
    }

    /// Rebuild the PrepareResponse payloads.
    pub fn prepare_responses(
        &self,
        recovery: &ConsensusPayload,
        primary: u16,
    ) -> Vec<ConsensusPayload> {
        let Some(preparation_hash) = self.preparation_digest(recovery, primary) else {
            return Vec::new();
        };
        self.preparations
            .iter()
            .map(|stub| {
                ConsensusPayload::new(
                    stub.validator_index,
                    recovery.height,
                    recovery.view,
                    Message::PrepareResponse(PrepareResponse { preparation_hash }),
                )
            })
            .collect()
    }

    /// Rebuild the ChangeView payloads at their original views.
    pub fn change_views(&self, recovery: &ConsensusPayload) -> Vec<ConsensusPayload> {
        self.change_views
            .iter()
            .map(|stub| {
                ConsensusPayload::new(
                    stub.validator_index,
                    recovery.height,
                    stub.original_view_number,
                    Message::ChangeView(ChangeView {
                        new_view_number: stub.original_view_number.wrapping_add(1),
                        timestamp: stub.timestamp,
                        reason: ChangeViewReason::Timeout,
                    }),
                )
            })
            .collect()
    }

    /// Rebuild the Commit payloads at the views they were issued for.
    pub fn commits(&self, recovery: &ConsensusPayload) -> Vec<ConsensusPayload> {
        self.commits
            .iter()
            .map(|stub| {
                ConsensusPayload::new(
                    stub.validator_index,
                    recovery.height,
                    stub.view_number,
                    Message::Commit(Commit {
                        signature: stub.signature,
                    }),
                )
            })
            .collect()
    }
}

impl Encode for RecoveryMessage {
    fn encode(&self, w: &mut BinWriter) {
        w.write_array(&self.change_views);
        match &self.preparation {
            PreparationProof::Request(req) => {
                w.write_bool(true);
                req.encode(w);
            }
            PreparationProof::Digest(hash) => {
                w.write_bool(false);
                w.write_var_bytes(hash.as_bytes());
            }
            PreparationProof::Absent => {
                w.write_bool(false);
                w.write_var_uint(0);
            }
        }
        w.write_array(&self.preparations);
        w.write_array(&self.commits);
    }
}

impl Decode for RecoveryMessage {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        let change_views = r.read_array(MAX_RECOVERY_ENTRIES)?;
        let preparation = if r.read_bool()? {
            PreparationProof::Request(PrepareRequest::decode(r)?)
        } else {
            let bytes = r.read_var_bytes(Hash::SIZE as u64)?;
            match bytes.len() {
                0 => PreparationProof::Absent,
                32 => {
                    let mut out = [0u8; 32];
                    out.copy_from_slice(bytes);
                    PreparationProof::Digest(Hash::new(out))
                }
                n => {
                    return Err(WireError::LengthExceedsLimit {
                        len: n as u64,
                        max: Hash::SIZE as u64,
                    })
                }
            }
        };
        Ok(Self {
            change_views,
            preparation,
            preparations: r.read_array(MAX_RECOVERY_ENTRIES)?,
            commits: r.read_array(MAX_RECOVERY_ENTRIES)?,
        })
    }
}
