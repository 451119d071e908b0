//! Packet Buffer
//!
//! ## Purpose
//!
//! A single contiguous allocation holding one frame, used much like a kernel
//! socket buffer. The allocation is partitioned as
//!
//! ```text
//! 0          head_room   +HEADER_SIZE        tail_offset      +tail_room     data_size
//! ├─ head ───┼─ header ──┼─ payload ─────────┼─ tail ─────────┼─ slack ──────┤
//! ```
//!
//! Only the two margin sizes are stored. Header, payload and tail offsets are
//! derived on access from the margins and the header's `pkt_len` field, so a
//! packet can be moved or cloned without fixing up any pointers.
//!
//! ## Head and tail room
//!
//! Frames read straight off a transport have zero margins: the header sits at
//! offset 0 and the payload follows it. Components that prepend or append data
//! in place (VLAN tags, tunnel headers) ask the owning connection for non-zero
//! margins up front through [`PacketProperties`], so that forwarding never
//! needs a reallocation.
//!
//! ## Preconditions
//!
//! The layout operations ([`Packet::init`], [`Packet::copy_from`],
//! [`Packet::compact_copy_from`], [`Packet::push`], ...) sit on the
//! forwarding path. Their size preconditions are the caller's responsibility
//! and are only checked with `debug_assert!`. Use [`Packet::try_new`] and
//! [`Packet::validate`] where inputs are not already trusted.

use crate::error::{PacketError, Result};
use crate::header::{PacketHeader, PayloadType, HEADER_SIZE, HEADER_VERSION, MAX_PAYLOAD_SIZE};
use bytes::BytesMut;
use std::fmt;
use zerocopy::byteorder::U16;
use zerocopy::AsBytes;

/// Margins a connection reserves around every payload it produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketProperties {
    pub head_size: usize,
    pub tail_size: usize,
}

impl PacketProperties {
    pub const fn new(head_size: usize, tail_size: usize) -> Self {
        Self {
            head_size,
            tail_size,
        }
    }

    /// Allocation size needed to carry `payload_max` bytes with these margins
    pub const fn data_size_for(&self, payload_max: usize) -> usize {
        self.head_size + HEADER_SIZE + payload_max + self.tail_size
    }

    /// Widen to satisfy both `self` and `other`
    pub fn merge(self, other: PacketProperties) -> Self {
        Self {
            head_size: self.head_size.max(other.head_size),
            tail_size: self.tail_size.max(other.tail_size),
        }
    }
}

/// Frame buffer with head room, header, payload and tail room
#[derive(Clone)]
pub struct Packet {
    data: BytesMut,
    head_room: usize,
    tail_room: usize,
}

impl Packet {
    /// Allocate `data_size` bytes and lay them out with the given margins.
    ///
    /// The payload takes every byte not used by the margins and header
    /// (capped at [`MAX_PAYLOAD_SIZE`]; anything beyond becomes slack).
    ///
    /// Caller precondition: `head_size + HEADER_SIZE + tail_size <= data_size`.
    pub fn new(data_size: usize, head_size: usize, tail_size: usize) -> Self {
        let mut packet = Self {
            data: BytesMut::zeroed(data_size),
            head_room: 0,
            tail_room: 0,
        };
        packet.init(head_size, tail_size);
        packet
    }

    /// Checked variant of [`Packet::new`]
    pub fn try_new(data_size: usize, head_size: usize, tail_size: usize) -> Result<Self> {
        let need = head_size + HEADER_SIZE + tail_size;
        if need > data_size {
            return Err(PacketError::too_small(need, data_size, "packet init"));
        }
        Ok(Self::new(data_size, head_size, tail_size))
    }

    /// Allocate a packet just large enough for `payload` with `props` margins
    pub fn from_payload(payload: &[u8], payload_type: PayloadType, props: PacketProperties) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        let mut packet = Self::new(props.data_size_for(payload.len()), props.head_size, props.tail_size);
        packet.set_payload_type(payload_type);
        packet.payload_mut().copy_from_slice(payload);
        packet
    }

    /// Re-establish the layout inside the existing allocation.
    ///
    /// Caller precondition: `head_size + HEADER_SIZE + tail_size <= data_size`.
    pub fn init(&mut self, head_size: usize, tail_size: usize) {
        let data_size = self.data.len();
        debug_assert!(
            head_size + HEADER_SIZE + tail_size <= data_size,
            "margins {}+{} do not fit in {} bytes",
            head_size,
            tail_size,
            data_size
        );
        let payload_len = (data_size - head_size - HEADER_SIZE - tail_size).min(MAX_PAYLOAD_SIZE);
        self.head_room = head_size;
        self.tail_room = tail_size;
        let header = PacketHeader::new(PayloadType::Raw, payload_len as u16);
        self.header_bytes_mut().copy_from_slice(header.as_bytes());
    }

    /// Total allocation size
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn head_room(&self) -> usize {
        self.head_room
    }

    pub fn tail_room(&self) -> usize {
        self.tail_room
    }

    /// Bytes beyond the tail margin
    pub fn slack(&self) -> usize {
        self.data.len() - self.tail_offset() - self.tail_room
    }

    pub fn header_offset(&self) -> usize {
        self.head_room
    }

    pub fn payload_offset(&self) -> usize {
        self.head_room + HEADER_SIZE
    }

    /// Start of the tail margin
    pub fn tail_offset(&self) -> usize {
        self.payload_offset() + self.payload_len()
    }

    pub fn payload_len(&self) -> usize {
        self.header().len()
    }

    /// Largest payload this allocation can carry while keeping the current
    /// head and tail margins
    pub fn max_payload_len(&self) -> usize {
        (self.data.len() - self.payload_offset() - self.tail_room).min(MAX_PAYLOAD_SIZE)
    }

    /// Copy of the header in front of the payload
    pub fn header(&self) -> PacketHeader {
        let offset = self.head_room;
        let bytes = &self.data[offset..offset + HEADER_SIZE];
        PacketHeader {
            version: bytes[0],
            payload_type: bytes[1],
            pkt_len: U16::from_bytes([bytes[2], bytes[3]]),
        }
    }

    fn update_header(&mut self, update: impl FnOnce(&mut PacketHeader)) {
        let mut header = self.header();
        update(&mut header);
        self.header_bytes_mut().copy_from_slice(header.as_bytes());
    }

    fn header_bytes_mut(&mut self) -> &mut [u8] {
        let offset = self.head_room;
        &mut self.data[offset..offset + HEADER_SIZE]
    }

    pub fn set_payload_type(&mut self, payload_type: PayloadType) {
        self.update_header(|header| header.payload_type = payload_type as u8);
    }

    pub fn payload(&self) -> &[u8] {
        let start = self.payload_offset();
        &self.data[start..start + self.payload_len()]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.payload_offset();
        let end = start + self.payload_len();
        &mut self.data[start..end]
    }

    /// Header followed by payload, as sent on the wire
    pub fn wire_bytes(&self) -> &[u8] {
        &self.data[self.header_offset()..self.tail_offset()]
    }

    /// The whole allocation, margins and slack included
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the whole payload capacity, for reading a frame
    /// straight into the buffer before [`Packet::set_payload_len`].
    pub fn payload_capacity_mut(&mut self) -> &mut [u8] {
        let start = self.payload_offset();
        let end = start + self.max_payload_len();
        &mut self.data[start..end]
    }

    /// Set the payload length after a read; the tail margin keeps its size.
    ///
    /// Caller precondition: `len <= max_payload_len()`.
    pub fn set_payload_len(&mut self, len: usize) {
        debug_assert!(len <= self.max_payload_len());
        self.update_header(|header| header.set_len(len as u16));
    }

    /// Grow the payload at its front by `len` bytes taken from the head room
    /// and return the new leading bytes. The header moves back with it.
    ///
    /// Caller precondition: `len <= head_room()`.
    pub fn push(&mut self, len: usize) -> &mut [u8] {
        debug_assert!(len <= self.head_room);
        debug_assert!(self.payload_len() + len <= MAX_PAYLOAD_SIZE);
        let old = self.head_room;
        let new_len = (self.payload_len() + len) as u16;
        self.data.copy_within(old..old + HEADER_SIZE, old - len);
        self.head_room = old - len;
        self.update_header(|header| header.set_len(new_len));
        let start = self.payload_offset();
        &mut self.data[start..start + len]
    }

    /// Checked variant of [`Packet::push`]
    pub fn try_push(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > self.head_room {
            return Err(PacketError::insufficient_room("head", len, self.head_room));
        }
        if self.payload_len() + len > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: self.payload_len() + len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(self.push(len))
    }

    /// Strip `len` bytes from the front of the payload, returning them to the
    /// head room.
    ///
    /// Caller precondition: `len <= payload_len()`.
    pub fn pull(&mut self, len: usize) {
        debug_assert!(len <= self.payload_len());
        let old = self.head_room;
        let new_len = (self.payload_len() - len) as u16;
        self.data.copy_within(old..old + HEADER_SIZE, old + len);
        self.head_room = old + len;
        self.update_header(|header| header.set_len(new_len));
    }

    /// Grow the payload at its back by `len` bytes and return the new
    /// trailing bytes. The tail room is consumed first, then the slack
    /// behind it; a tail margin that is fully used ends up empty.
    ///
    /// Caller precondition: `len <= tail_room() + slack()`.
    pub fn put(&mut self, len: usize) -> &mut [u8] {
        debug_assert!(len <= self.tail_room + self.slack());
        debug_assert!(self.payload_len() + len <= MAX_PAYLOAD_SIZE);
        let start = self.tail_offset();
        let new_len = (self.payload_len() + len) as u16;
        self.tail_room -= len.min(self.tail_room);
        self.update_header(|header| header.set_len(new_len));
        &mut self.data[start..start + len]
    }

    /// Checked variant of [`Packet::put`]
    pub fn try_put(&mut self, len: usize) -> Result<&mut [u8]> {
        let available = self.tail_room + self.slack();
        if len > available {
            return Err(PacketError::insufficient_room("tail", len, available));
        }
        if self.payload_len() + len > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: self.payload_len() + len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(self.put(len))
    }

    /// Drop `len` bytes from the back of the payload, returning them to the
    /// tail room.
    ///
    /// Caller precondition: `len <= payload_len()`.
    pub fn trim(&mut self, len: usize) {
        debug_assert!(len <= self.payload_len());
        let new_len = (self.payload_len() - len) as u16;
        self.tail_room += len;
        self.update_header(|header| header.set_len(new_len));
    }

    /// Bytes `copy_from` needs in the destination to hold this packet
    pub fn populated_size(&self) -> usize {
        self.tail_offset() + self.tail_room
    }

    /// Bytes `compact_copy_from` needs in the destination
    pub fn compact_size(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Copy head room, header, payload and tail room of `src` into this
    /// packet at the same offsets. Capacity beyond `src.populated_size()`
    /// is left as slack.
    ///
    /// Caller precondition: `self.data_size() >= src.populated_size()`. The
    /// copy never truncates.
    pub fn copy_from(&mut self, src: &Packet) {
        let span = src.populated_size();
        debug_assert!(
            self.data.len() >= span,
            "destination holds {} bytes, source spans {}",
            self.data.len(),
            span
        );
        self.data[..span].copy_from_slice(&src.data[..span]);
        self.head_room = src.head_room;
        self.tail_room = src.tail_room;
    }

    /// Copy only header and payload of `src`, with zero head and tail room.
    ///
    /// Caller precondition: `self.data_size() >= src.compact_size()`.
    pub fn compact_copy_from(&mut self, src: &Packet) {
        let span = src.compact_size();
        debug_assert!(
            self.data.len() >= span,
            "destination holds {} bytes, compact copy needs {}",
            self.data.len(),
            span
        );
        self.data[..span].copy_from_slice(src.wire_bytes());
        self.head_room = 0;
        self.tail_room = 0;
    }

    /// Re-check every layout invariant, including the header's declared
    /// payload length. Intended for packets whose bytes came from elsewhere.
    pub fn validate(&self) -> Result<()> {
        let fixed = self.head_room + HEADER_SIZE + self.tail_room;
        if fixed > self.data.len() {
            return Err(PacketError::too_small(fixed, self.data.len(), "packet layout"));
        }
        let header = self.header();
        if header.version != HEADER_VERSION {
            return Err(PacketError::UnsupportedVersion {
                version: header.version,
                supported: HEADER_VERSION,
            });
        }
        let max = self.max_payload_len();
        if header.len() > max {
            return Err(PacketError::LengthMismatch {
                declared: header.len(),
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("data_size", &self.data.len())
            .field("head_room", &self.head_room)
            .field("payload_len", &self.payload_len())
            .field("tail_room", &self.tail_room)
            .field("payload_type", &self.header().payload_type)
            .finish()
    }
}
