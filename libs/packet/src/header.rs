//! Packet Wire Header
//!
//! Every frame exchanged between components starts with the same 4-byte
//! header. It travels on the wire unchanged, so its layout is fixed:
//!
//! ```text
//! ┌─────────┬──────────────┬───────────────────────┐
//! │ version │ payload_type │ pkt_len (big endian)  │
//! │ 1 byte  │ 1 byte       │ 2 bytes               │
//! └─────────┴──────────────┴───────────────────────┘
//! ```
//!
//! `pkt_len` is always stored in network byte order so that packets copied
//! between hosts decode identically.

use crate::error::{PacketError, Result};
use zerocopy::byteorder::{NetworkEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Current header version
pub const HEADER_VERSION: u8 = 1;

/// Size of [`PacketHeader`] on the wire
pub const HEADER_SIZE: usize = 4;

/// Ethernet frame plus trailing bytes as carried by vde2-compatible links
pub const MAX_ETH_FRAME_SIZE: usize = 1504;

/// Largest payload a header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Frame header (4 bytes, unaligned, no padding)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct PacketHeader {
    pub version: u8,
    pub payload_type: u8,
    pub pkt_len: U16<NetworkEndian>,
}

impl PacketHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(payload_type: PayloadType, pkt_len: u16) -> Self {
        Self {
            version: HEADER_VERSION,
            payload_type: payload_type as u8,
            pkt_len: U16::new(pkt_len),
        }
    }

    /// Payload length in host order
    pub fn len(&self) -> usize {
        self.pkt_len.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pkt_len.get() == 0
    }

    pub fn set_len(&mut self, len: u16) {
        self.pkt_len.set(len);
    }

    pub fn payload_type(&self) -> Result<PayloadType> {
        PayloadType::try_from(self.payload_type)
    }

    /// Check the version byte
    pub fn validate(&self) -> Result<()> {
        if self.version != HEADER_VERSION {
            return Err(PacketError::UnsupportedVersion {
                version: self.version,
                supported: HEADER_VERSION,
            });
        }
        Ok(())
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::too_small(HEADER_SIZE, bytes.len(), "header parse"));
        }
        Self::read_from(&bytes[..HEADER_SIZE])
            .ok_or_else(|| PacketError::too_small(HEADER_SIZE, bytes.len(), "header parse"))
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::new(PayloadType::Raw, 0)
    }
}

/// Payload type tag carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Opaque bytes, no interpretation
    Raw = 0,
    /// Ethernet frame
    Ethernet = 1,
    /// Frame framed the way vde2 switches exchange it
    Vde2 = 2,
}

impl TryFrom<u8> for PayloadType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PayloadType::Raw),
            1 => Ok(PayloadType::Ethernet),
            2 => Ok(PayloadType::Vde2),
            other => Err(PacketError::UnknownPayloadType { tag: other }),
        }
    }
}
