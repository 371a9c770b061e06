//! ChangeView body.

use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};

/// Why a validator asked to abandon the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeViewReason {
    /// No progress within the view timeout.
    Timeout = 0x00,
    /// The proposed block contained an invalid transaction.
    TxInvalid = 0x01,
    /// The proposed block failed host policy.
    BlockRejectedByPolicy = 0x02,
    /// Joining an already-formed change-view quorum.
    ChangeAgreement = 0x03,
}

impl ChangeViewReason {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Timeout),
            0x01 => Some(Self::TxInvalid),
            0x02 => Some(Self::BlockRejectedByPolicy),
            0x03 => Some(Self::ChangeAgreement),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeViewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "Timeout",
            Self::TxInvalid => "TxInvalid",
            Self::BlockRejectedByPolicy => "BlockRejectedByPolicy",
            Self::ChangeAgreement => "ChangeAgreement",
        };
        f.write_str(name)
    }
}

/// A validator's request to move to a higher view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeView {
    /// The view the sender wants to move to. Carried explicitly on the wire.
    pub new_view_number: u8,
    /// Sender's clock when the request was made, milliseconds.
    pub timestamp: u64,
    pub reason: ChangeViewReason,
}

impl Encode for ChangeView {
    fn encode(&self, w: &mut BinWriter) {
        w.write_u64(self.timestamp);
        w.write_u8(self.reason as u8);
        w.write_u8(self.new_view_number);
    }
}

impl Decode for ChangeView {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        let timestamp = r.read_u64()?;
        let reason_tag = r.read_u8()?;
        let reason = ChangeViewReason::from_tag(reason_tag).ok_or(WireError::InvalidEnum {
            what: "change view reason",
            value: reason_tag,
        })?;
        Ok(Self {
            new_view_number: r.read_u8()?,
            timestamp,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cv = ChangeView {
            new_view_number: 3,
            timestamp: 1_700_000_123,
            reason: ChangeViewReason::Timeout,
        };
        assert_eq!(ChangeView::from_bytes(&cv.to_bytes()).unwrap(), cv);
    }

    #[test]
    fn unknown_reason_is_rejected() {
        let mut w = BinWriter::new();
        w.write_u64(0);
        w.write_u8(0x7F);
        w.write_u8(1);
        assert!(matches!(
            ChangeView::from_bytes(&w.into_bytes()),
            Err(WireError::InvalidEnum { value: 0x7F, .. })
        ));
    }
}
