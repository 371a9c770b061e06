//! The consensus payload envelope.

use dbft_types::Hash;
use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};
use thiserror::Error;

use crate::{
    ChangeView, Commit, Message, MessageType, PrepareRequest, PrepareResponse, RecoveryMessage,
    RecoveryRequest,
};

/// Why a payload failed to decode or validate structurally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    #[error("validator index {index} out of range for {validators} validators")]
    ValidatorIndexOutOfRange { index: u16, validators: usize },
}

/// Envelope carried by every consensus message.
///
/// Encoded as `[type u8][validatorIndex u16][height u32][view u8][body]`;
/// the payload hash is the blake3 digest of exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusPayload {
    /// Index of the sending validator in the current validator set.
    pub validator_index: u16,
    /// Height this message belongs to.
    pub height: u32,
    /// View this message was issued at.
    pub view: u8,
    pub message: Message,
}

impl ConsensusPayload {
    pub fn new(validator_index: u16, height: u32, view: u8, message: Message) -> Self {
        Self {
            validator_index,
            height,
            view,
            message,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Hash of the canonical encoding.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.to_bytes())
    }

    /// Decode a payload and reject validator indices outside the set.
    pub fn decode_for(bytes: &[u8], validators: usize) -> Result<Self, PayloadError> {
        let payload = Self::decode_from(bytes)?;
        if payload.validator_index as usize >= validators {
            return Err(PayloadError::ValidatorIndexOutOfRange {
                index: payload.validator_index,
                validators,
            });
        }
        Ok(payload)
    }

    /// Decode a payload, rejecting trailing bytes.
    pub fn decode_from(bytes: &[u8]) -> Result<Self, PayloadError> {
        let mut r = BinReader::new(bytes);
        let payload = Self::decode_inner(&mut r)?;
        r.expect_eof().map_err(PayloadError::Wire)?;
        Ok(payload)
    }

    fn decode_inner(r: &mut BinReader<'_>) -> Result<Self, PayloadError> {
        let tag = r.read_u8()?;
        let message_type =
            MessageType::from_tag(tag).ok_or(PayloadError::UnknownMessageType(tag))?;
        let validator_index = r.read_u16()?;
        let height = r.read_u32()?;
        let view = r.read_u8()?;
        let message = match message_type {
            MessageType::PrepareRequest => Message::PrepareRequest(PrepareRequest::decode(r)?),
            MessageType::PrepareResponse => Message::PrepareResponse(PrepareResponse::decode(r)?),
            MessageType::ChangeView => Message::ChangeView(ChangeView::decode(r)?),
            MessageType::Commit => Message::Commit(Commit::decode(r)?),
            MessageType::RecoveryRequest => Message::RecoveryRequest(RecoveryRequest::decode(r)?),
            MessageType::RecoveryMessage => Message::RecoveryMessage(RecoveryMessage::decode(r)?),
        };
        Ok(Self {
            validator_index,
            height,
            view,
            message,
        })
    }
}

impl Encode for ConsensusPayload {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u8(self.message_type() as u8);
        w.write_u16(self.validator_index);
        w.write_u32(self.height);
        w.write_u8(self.view);
        match &self.message {
            Message::PrepareRequest(m) => m.encode(w),
            Message::PrepareResponse(m) => m.encode(w),
            Message::ChangeView(m) => m.encode(w),
            Message::Commit(m) => m.encode(w),
            Message::RecoveryRequest(m) => m.encode(w),
            Message::RecoveryMessage(m) => m.encode(w),
        }
    }
}
