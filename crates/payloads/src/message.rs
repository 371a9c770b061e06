//! Message sum type and wire tags.

use crate::{
    ChangeView, Commit, PrepareRequest, PrepareResponse, RecoveryMessage, RecoveryRequest,
};

/// Wire tag of a consensus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    PrepareRequest = 0x20,
    PrepareResponse = 0x21,
    ChangeView = 0x22,
    Commit = 0x30,
    RecoveryRequest = 0x40,
    RecoveryMessage = 0x41,
}

impl MessageType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x20 => Some(Self::PrepareRequest),
            0x21 => Some(Self::PrepareResponse),
            0x22 => Some(Self::ChangeView),
            0x30 => Some(Self::Commit),
            0x40 => Some(Self::RecoveryRequest),
            0x41 => Some(Self::RecoveryMessage),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrepareRequest => "PrepareRequest",
            Self::PrepareResponse => "PrepareResponse",
            Self::ChangeView => "ChangeView",
            Self::Commit => "Commit",
            Self::RecoveryRequest => "RecoveryRequest",
            Self::RecoveryMessage => "RecoveryMessage",
        };
        f.write_str(name)
    }
}

/// A consensus message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PrepareRequest(PrepareRequest),
    PrepareResponse(PrepareResponse),
    ChangeView(ChangeView),
    Commit(Commit),
    RecoveryRequest(RecoveryRequest),
    RecoveryMessage(RecoveryMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::PrepareRequest(_) => MessageType::PrepareRequest,
            Message::PrepareResponse(_) => MessageType::PrepareResponse,
            Message::ChangeView(_) => MessageType::ChangeView,
            Message::Commit(_) => MessageType::Commit,
            Message::RecoveryRequest(_) => MessageType::RecoveryRequest,
            Message::RecoveryMessage(_) => MessageType::RecoveryMessage,
        }
    }
}
