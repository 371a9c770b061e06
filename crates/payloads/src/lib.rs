//! Consensus message types and their wire codec.
//!
//! Every message travels in a [`ConsensusPayload`] envelope:
//!
//! ```text
//! [type: u8][validatorIndex: u16 LE][height: u32 LE][view: u8][body]
//! ```
//!
//! The payload hash is the blake3 digest of that canonical encoding, so a
//! PrepareResponse can endorse a PrepareRequest by hash alone and a
//! reconstructed payload (from a recovery bundle) hashes identically to the
//! original.
//!
//! Message bodies live one per module; [`Message`] is the sum type the
//! engine dispatches on.

mod change_view;
mod commit;
mod message;
mod payload;
mod prepare_request;
mod prepare_response;
mod recovery;

pub use change_view::{ChangeView, ChangeViewReason};
pub use commit::Commit;
pub use message::{Message, MessageType};
pub use payload::{ConsensusPayload, PayloadError};
pub use prepare_request::{PrepareRequest, MAX_TRANSACTIONS_PER_BLOCK};
pub use prepare_response::PrepareResponse;
pub use recovery::{
    ChangeViewCompact, CommitCompact, PreparationCompact, PreparationProof, RecoveryMessage,
    RecoveryRequest,
};
