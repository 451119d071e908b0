//! Packet buffer errors
//!
//! Only the checked entry points ([`Packet::try_new`](crate::Packet::try_new),
//! [`Packet::validate`](crate::Packet::validate), header parsing) return these.
//! The forwarding path relies on documented caller preconditions instead.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer cannot hold the requested layout
    #[error("Buffer too small: need {need} bytes, got {got} (context: {context})")]
    TooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// Payload would not fit the 16-bit length field
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Not enough reserved room at the front or back of the payload
    #[error("Insufficient {side} room: need {need} bytes, have {available}")]
    InsufficientRoom {
        side: &'static str,
        need: usize,
        available: usize,
    },

    /// Header length field disagrees with the buffer layout
    #[error("Header length {declared} inconsistent with layout (max payload {max})")]
    LengthMismatch { declared: usize, max: usize },

    #[error("Unsupported header version {version}: supported version is {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    #[error("Unknown payload type {tag}")]
    UnknownPayloadType { tag: u8 },
}

pub type Result<T> = std::result::Result<T, PacketError>;

impl PacketError {
    pub fn too_small(need: usize, got: usize, context: &'static str) -> Self {
        Self::TooSmall { need, got, context }
    }

    pub fn insufficient_room(side: &'static str, need: usize, available: usize) -> Self {
        Self::InsufficientRoom {
            side,
            need,
            available,
        }
    }
}
