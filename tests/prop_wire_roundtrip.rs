use bytes::Bytes;
use proptest::prelude::*;
use treecast::address::Address;
use treecast::wire::{decode_frame, encode_message};

proptest! {
    #[test]
    fn message_frames_round_trip_for_arbitrary_payloads(
        a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255,
        port in 1u16..=65535,
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let src = Address::from_parts([a, b, c, d], port);
        let frame = encode_message(&src, &payload);
        let pkt = decode_frame(Bytes::copy_from_slice(&frame)).unwrap();
        prop_assert_eq!(pkt.src, src);
        prop_assert_eq!(&pkt.body[..], &payload[..]);
    }

    #[test]
    fn truncated_frames_never_panic_the_decoder(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_frame(Bytes::copy_from_slice(&data));
    }
}
