use proptest::prelude::*;
use treecast::address::Address;

proptest! {
    #[test]
    fn canonical_form_is_idempotent(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255, port in 0u16..=65535) {
        let addr = Address::from_parts([a, b, c, d], port);
        let rendered = addr.to_string();
        let (ip, port_str) = rendered.split_once(':').unwrap();
        let reparsed = Address::parse(ip, port_str).unwrap();
        prop_assert_eq!(addr, reparsed);
    }

    #[test]
    fn octets_round_trip(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255, port in 0u16..=65535) {
        let addr = Address::from_parts([a, b, c, d], port);
        prop_assert_eq!(addr.octets(), [a, b, c, d]);
        prop_assert_eq!(addr.port(), port);
    }
}
