//! Binary frame layout: fixed header + variable payload
//!
//! Frame format:
//! ```text
//! +----------------+----------------+------------------+
//! | ops            | length         | payload          |
//! | (2 bytes, BE)  | (2 bytes, BE)  | (length bytes)   |
//! +----------------+----------------+------------------+
//! ```
//!
//! Both header fields are big-endian (network byte order); the choice is part
//! of the wire contract and must match on both peers.
//!
//! The `ops` field packs three sub-fields plus two flags:
//! bits 0-3 message kind, bits 4-7 broadcast width, bit 8 commit, bit 9 fin.

use bytes::Bytes;

use crate::error::{CastError, Result};

/// Frame header size: 2 bytes ops + 2 bytes length
pub const HEADER_SIZE: usize = 4;

/// Maximum frame payload size; `length` is a u16
pub const MAX_PAYLOAD: usize = 65535;

/// Message kind, bits 0-3 of `ops`
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Chat message, client to client
    Chat = 0x1,
    /// Client command, client to server
    ClientCommand = 0x2,
    /// Server command, server to client
    ServerCommand = 0x3,
    /// Informational message, server to client
    ServerInfo = 0x4,
    /// Error message, server to client
    ServerError = 0x5,
    /// Informational message with no remote addressee
    LocalInfo = 0x6,
    /// Error message with no remote addressee
    LocalError = 0x7,
}

impl MessageKind {
    /// Convert from the low bits of `ops`, `None` for unknown values
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(MessageKind::Chat),
            0x2 => Some(MessageKind::ClientCommand),
            0x3 => Some(MessageKind::ServerCommand),
            0x4 => Some(MessageKind::ServerInfo),
            0x5 => Some(MessageKind::ServerError),
            0x6 => Some(MessageKind::LocalInfo),
            0x7 => Some(MessageKind::LocalError),
            _ => None,
        }
    }

    /// Whether this kind is delivered through the local diagnostic queue
    pub fn is_local(&self) -> bool {
        matches!(self, MessageKind::LocalInfo | MessageKind::LocalError)
    }
}

/// Broadcast width, bits 4-7 of `ops`: which connections receive the message
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastWidth {
    /// The active connection only
    Active = 0x1,
    /// Connections of the room's mates, except the active connection
    MatesExceptSelf = 0x2,
    /// Connections of the room's mates, including the active connection
    Mates = 0x3,
    /// All connections currently in the room, except the active connection
    RoomExceptSelf = 0x4,
    /// All connections currently in the room, including the active connection
    Room = 0x5,
}

impl BroadcastWidth {
    /// Convert from the width bits of `ops`, `None` for unknown values
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(BroadcastWidth::Active),
            0x2 => Some(BroadcastWidth::MatesExceptSelf),
            0x3 => Some(BroadcastWidth::Mates),
            0x4 => Some(BroadcastWidth::RoomExceptSelf),
            0x5 => Some(BroadcastWidth::Room),
            _ => None,
        }
    }

    /// Whether the originating connection is among the targets
    pub fn includes_self(&self) -> bool {
        matches!(
            self,
            BroadcastWidth::Active | BroadcastWidth::Mates | BroadcastWidth::Room
        )
    }
}

const KIND_MASK: u16 = 0x000F;
const WIDTH_MASK: u16 = 0x00F0;
const WIDTH_SHIFT: u16 = 4;
const COMMIT_FLAG: u16 = 1 << 8;
const FIN_FLAG: u16 = 1 << 9;
const KNOWN_BITS: u16 = KIND_MASK | WIDTH_MASK | COMMIT_FLAG | FIN_FLAG;

/// Packed `ops` header field
///
/// Values built through [`Ops::new`] always carry a valid kind and width;
/// values off the wire go through [`Ops::from_raw`], which validates both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ops(u16);

impl Ops {
    /// Pack a kind and width with no flags set
    pub fn new(kind: MessageKind, width: BroadcastWidth) -> Self {
        Ops(kind as u16 | ((width as u16) << WIDTH_SHIFT))
    }

    /// Validate a raw wire value
    pub fn from_raw(raw: u16) -> Result<Self> {
        if raw & !KNOWN_BITS != 0 {
            return Err(CastError::connection(format!(
                "unknown ops bits: {:#06x}",
                raw
            )));
        }
        MessageKind::from_u16(raw & KIND_MASK)
            .ok_or_else(|| CastError::connection(format!("unknown message kind in ops {:#06x}", raw)))?;
        BroadcastWidth::from_u16((raw & WIDTH_MASK) >> WIDTH_SHIFT)
            .ok_or_else(|| CastError::connection(format!("unknown broadcast width in ops {:#06x}", raw)))?;
        Ok(Ops(raw))
    }

    /// Raw wire value
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Message kind sub-field
    pub fn kind(&self) -> MessageKind {
        // Valid by construction; Chat is unreachable as a fallback.
        MessageKind::from_u16(self.0 & KIND_MASK).unwrap_or(MessageKind::Chat)
    }

    /// Broadcast width sub-field
    pub fn width(&self) -> BroadcastWidth {
        BroadcastWidth::from_u16((self.0 & WIDTH_MASK) >> WIDTH_SHIFT)
            .unwrap_or(BroadcastWidth::Active)
    }

    /// Set the commit flag
    pub fn with_commit(self) -> Self {
        Ops(self.0 | COMMIT_FLAG)
    }

    /// Set the fin flag: close the connection once the frame is fully written
    pub fn with_fin(self) -> Self {
        Ops(self.0 | FIN_FLAG)
    }

    /// Whether the commit flag is set
    pub fn is_commit(&self) -> bool {
        self.0 & COMMIT_FLAG != 0
    }

    /// Whether the fin flag is set
    pub fn is_fin(&self) -> bool {
        self.0 & FIN_FLAG != 0
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Packed kind/width/flags
    pub ops: Ops,
    /// Payload byte count
    pub len: u16,
}

impl FrameHeader {
    /// Encode to the fixed 4-byte wire layout; no error path
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let ops = self.ops.raw().to_be_bytes();
        let len = self.len.to_be_bytes();
        [ops[0], ops[1], len[0], len[1]]
    }

    /// Decode from the fixed 4-byte wire layout, validating `ops`
    pub fn decode(bytes: [u8; HEADER_SIZE]) -> Result<Self> {
        let ops = Ops::from_raw(u16::from_be_bytes([bytes[0], bytes[1]]))?;
        let len = u16::from_be_bytes([bytes[2], bytes[3]]);
        Ok(FrameHeader { ops, len })
    }
}

/// A single decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Raw payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, truncating the payload at [`MAX_PAYLOAD`]
    pub fn new(ops: Ops, payload: impl Into<Bytes>) -> Self {
        let mut payload: Bytes = payload.into();
        payload.truncate(MAX_PAYLOAD);
        Self {
            header: FrameHeader {
                ops,
                len: payload.len() as u16,
            },
            payload,
        }
    }

    /// Total encoded size of this frame
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_packing() {
        let ops = Ops::new(MessageKind::Chat, BroadcastWidth::Mates).with_commit();
        assert_eq!(ops.kind(), MessageKind::Chat);
        assert_eq!(ops.width(), BroadcastWidth::Mates);
        assert!(ops.is_commit());
        assert!(!ops.is_fin());
        assert_eq!(ops.raw(), 0x1 | (0x3 << 4) | (1 << 8));
    }

    #[test]
    fn test_ops_fin_flag() {
        let ops = Ops::new(MessageKind::ServerInfo, BroadcastWidth::Active)
            .with_commit()
            .with_fin();
        assert!(ops.is_fin());
        let recovered = Ops::from_raw(ops.raw()).unwrap();
        assert_eq!(recovered, ops);
    }

    #[test]
    fn test_ops_rejects_unknown_kind() {
        // kind 0 and kind 8 are outside the defined range
        assert!(Ops::from_raw(0x10).is_err());
        assert!(Ops::from_raw(0x8 | (0x1 << 4)).is_err());
    }

    #[test]
    fn test_ops_rejects_unknown_width() {
        assert!(Ops::from_raw(0x1 | (0x6 << 4)).is_err());
        assert!(Ops::from_raw(0x1).is_err());
    }

    #[test]
    fn test_ops_rejects_stray_bits() {
        let valid = Ops::new(MessageKind::Chat, BroadcastWidth::Active).raw();
        assert!(Ops::from_raw(valid | 1 << 12).is_err());
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader {
            ops: Ops::new(MessageKind::ServerError, BroadcastWidth::Active).with_commit(),
            len: 513,
        };
        let encoded = header.encode();
        assert_eq!(FrameHeader::decode(encoded).unwrap(), header);
    }

    #[test]
    fn test_header_is_big_endian() {
        let header = FrameHeader {
            ops: Ops::new(MessageKind::Chat, BroadcastWidth::Active),
            len: 0x0102,
        };
        let encoded = header.encode();
        // ops = 0x0011: kind 1, width 1
        assert_eq!(encoded, [0x00, 0x11, 0x01, 0x02]);
    }

    #[test]
    fn test_frame_truncates_payload() {
        let ops = Ops::new(MessageKind::Chat, BroadcastWidth::Room).with_commit();
        let frame = Frame::new(ops, vec![0u8; MAX_PAYLOAD + 100]);
        assert_eq!(frame.payload.len(), MAX_PAYLOAD);
        assert_eq!(frame.header.len as usize, MAX_PAYLOAD);
    }

    #[test]
    fn test_local_kinds() {
        assert!(MessageKind::LocalInfo.is_local());
        assert!(MessageKind::LocalError.is_local());
        assert!(!MessageKind::ServerError.is_local());
    }

    #[test]
    fn test_width_includes_self() {
        assert!(BroadcastWidth::Active.includes_self());
        assert!(BroadcastWidth::Mates.includes_self());
        assert!(!BroadcastWidth::MatesExceptSelf.includes_self());
        assert!(BroadcastWidth::Room.includes_self());
        assert!(!BroadcastWidth::RoomExceptSelf.includes_self());
    }
}
