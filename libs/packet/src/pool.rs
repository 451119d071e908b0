//! Packet Pool
//!
//! Cached allocator for the connection that owns a stream of packets. Packets
//! are allocated and freed by the same connection, so the pool is plain
//! single-threaded state: released buffers are kept up to `capacity` and handed
//! back out, re-initialized with the current [`PacketProperties`].

use crate::header::MAX_ETH_FRAME_SIZE;
use crate::packet::{Packet, PacketProperties};
use tracing::trace;

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: u64,
    pub reused: u64,
    pub released: u64,
    pub discarded: u64,
}

pub struct PacketPool {
    payload_max: usize,
    props: PacketProperties,
    free: Vec<Packet>,
    capacity: usize,
    stats: PoolStats,
}

impl PacketPool {
    /// Pool of packets able to carry `payload_max` bytes with `props` margins,
    /// caching at most `capacity` released buffers.
    pub fn new(payload_max: usize, props: PacketProperties, capacity: usize) -> Self {
        Self {
            payload_max,
            props,
            free: Vec::with_capacity(capacity),
            capacity,
            stats: PoolStats::default(),
        }
    }

    /// Pool sized for ethernet frames
    pub fn for_frames(props: PacketProperties, capacity: usize) -> Self {
        Self::new(MAX_ETH_FRAME_SIZE, props, capacity)
    }

    pub fn data_size(&self) -> usize {
        self.props.data_size_for(self.payload_max)
    }

    pub fn properties(&self) -> PacketProperties {
        self.props
    }

    /// Change the margins for future packets. Cached buffers that are too
    /// small for the new layout are dropped.
    pub fn set_properties(&mut self, props: PacketProperties) {
        self.props = props;
        let need = self.data_size();
        let before = self.free.len();
        self.free.retain(|packet| packet.data_size() >= need);
        let dropped = before - self.free.len();
        if dropped > 0 {
            trace!(dropped, need, "flushed undersized cached packets");
            self.stats.discarded += dropped as u64;
        }
    }

    /// Hand out a packet laid out with the pool's margins and the full
    /// payload capacity
    pub fn acquire(&mut self) -> Packet {
        match self.free.pop() {
            Some(mut packet) => {
                packet.init(self.props.head_size, self.props.tail_size);
                self.stats.reused += 1;
                packet
            }
            None => {
                self.stats.allocated += 1;
                Packet::new(self.data_size(), self.props.head_size, self.props.tail_size)
            }
        }
    }

    /// Return a packet to the cache
    pub fn release(&mut self, packet: Packet) {
        self.stats.released += 1;
        if self.free.len() >= self.capacity || packet.data_size() < self.data_size() {
            self.stats.discarded += 1;
            return;
        }
        self.free.push(packet);
    }

    pub fn cached(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}
