//! # vswitch Packet Buffers
//!
//! Frame container shared by every component on the forwarding path.
//!
//! - [`Packet`]: one allocation holding head room, the 4-byte
//!   [`PacketHeader`], the payload and tail room
//! - [`PacketProperties`]: margins a connection reserves for its consumers
//! - [`PacketPool`]: cached allocator owned by a single connection
//!
//! Forwarding a frame unmodified costs no copy: components borrow the packet.
//! A component that must keep a frame beyond the call copies it with
//! [`Packet::copy_from`] or, when no working space is needed downstream,
//! [`Packet::compact_copy_from`].

pub mod error;
pub mod header;
pub mod packet;
pub mod pool;

pub use error::{PacketError, Result};
pub use header::{
    PacketHeader, PayloadType, HEADER_SIZE, HEADER_VERSION, MAX_ETH_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
pub use packet::{Packet, PacketProperties};
pub use pool::{PacketPool, PoolStats};
