//! Packet Buffer Property Tests
//!
//! Layout invariants that must hold for every valid combination of
//! allocation size and margins.

use proptest::prelude::*;
use vswitch_packet::{Packet, PacketProperties, PayloadType, HEADER_SIZE};

/// (data_size, head, tail) with head + HEADER_SIZE + tail <= data_size
fn layout() -> impl Strategy<Value = (usize, usize, usize)> {
    (0usize..64, 0usize..64, 0usize..2048)
        .prop_map(|(head, tail, payload)| (head + HEADER_SIZE + tail + payload, head, tail))
}

fn packet_with(payload: &[u8], head: usize, tail: usize) -> Packet {
    Packet::from_payload(payload, PayloadType::Ethernet, PacketProperties::new(head, tail))
}

proptest! {
    #[test]
    fn init_orders_regions((data_size, head, tail) in layout()) {
        let packet = Packet::new(data_size, head, tail);

        prop_assert!(packet.header_offset() + HEADER_SIZE <= packet.payload_offset());
        prop_assert!(packet.payload_offset() <= packet.tail_offset());
        prop_assert!(packet.tail_offset() + packet.tail_room() <= packet.data_size());
        prop_assert_eq!(packet.head_room(), head);
        prop_assert_eq!(packet.tail_room(), tail);
        prop_assert_eq!(packet.header().len(), packet.tail_offset() - packet.payload_offset());
        prop_assert!(packet.validate().is_ok());
    }

    #[test]
    fn compact_copy_preserves_payload(
        payload in prop::collection::vec(any::<u8>(), 0..1500),
        head in 0usize..32,
        tail in 0usize..32,
        extra in 0usize..64,
    ) {
        let src = packet_with(&payload, head, tail);
        let mut dst = Packet::new(src.compact_size() + extra, 0, 0);
        dst.compact_copy_from(&src);

        prop_assert_eq!(dst.payload(), &payload[..]);
        prop_assert_eq!(dst.head_room(), 0);
        prop_assert_eq!(dst.tail_room(), 0);
        prop_assert_eq!(dst.header(), src.header());
        prop_assert!(dst.validate().is_ok());
    }

    #[test]
    fn copy_transfers_every_region(
        payload in prop::collection::vec(any::<u8>(), 0..1500),
        head in 0usize..32,
        tail in 0usize..32,
        extra in 0usize..64,
    ) {
        let mut src = packet_with(&payload, head, tail);
        if head > 0 {
            // mark the head room so the copy of margin bytes is observable
            src.push(head).fill(0xee);
            src.pull(head);
        }
        let mut dst = Packet::new(src.populated_size() + extra, 0, 0);
        dst.copy_from(&src);

        prop_assert_eq!(dst.head_room(), src.head_room());
        prop_assert_eq!(dst.tail_room(), src.tail_room());
        prop_assert_eq!(dst.payload(), src.payload());
        prop_assert_eq!(
            &dst.as_bytes()[..src.populated_size()],
            &src.as_bytes()[..src.populated_size()]
        );
        prop_assert_eq!(dst.slack(), extra);
    }

    #[test]
    fn push_pull_round_trip_keeps_length_field(
        payload in prop::collection::vec(any::<u8>(), 1..512),
        head in 1usize..16,
    ) {
        let mut packet = packet_with(&payload, head, 0);
        let n = head.min(payload.len());
        packet.push(n);
        prop_assert_eq!(packet.header().len(), payload.len() + n);
        packet.pull(n);
        prop_assert_eq!(packet.header().len(), payload.len());
        prop_assert_eq!(packet.payload(), &payload[..]);
    }
}
