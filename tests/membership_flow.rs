use std::time::Instant;
use treecast::address::Address;
use treecast::link::LinkTable;
use treecast::membership::MembershipEngine;
use treecast::wire::{decode_frame, encode_advertise_req, encode_register_req};

fn addr(port: u16) -> Address {
    Address::parse_with_port("127.0.0.1", port).unwrap()
}

#[test]
fn two_clients_register_and_become_root_children() {
    let root = addr(3000);
    let a = addr(3001);
    let b = addr(3002);
    let mut engine = MembershipEngine::new(root.clone());
    let mut links = LinkTable::new();

    for client in [&a, &b] {
        let reg = decode_frame(encode_register_req(client, client)).unwrap();
        engine.handle_frame(&reg, &mut links, Instant::now()).unwrap();
        let adv = decode_frame(encode_advertise_req(client)).unwrap();
        engine.handle_frame(&adv, &mut links, Instant::now()).unwrap();
    }

    assert_eq!(engine.graph().parent_of(&a), Some(&root));
    assert_eq!(engine.graph().parent_of(&b), Some(&root));
    assert_eq!(engine.graph().child_count(&root), Some(2));
}

#[test]
fn third_client_becomes_grandchild() {
    let root = addr(4000);
    let a = addr(4001);
    let b = addr(4002);
    let c = addr(4003);
    let mut engine = MembershipEngine::new(root.clone());
    let mut links = LinkTable::new();

    for client in [&a, &b, &c] {
        let reg = decode_frame(encode_register_req(client, client)).unwrap();
        engine.handle_frame(&reg, &mut links, Instant::now()).unwrap();
        let adv = decode_frame(encode_advertise_req(client)).unwrap();
        engine.handle_frame(&adv, &mut links, Instant::now()).unwrap();
    }

    // root is full (a, b); c lands under whichever of a/b has room.
    let parent_of_c = engine.graph().parent_of(&c).unwrap();
    assert!(*parent_of_c == a || *parent_of_c == b);
    assert_eq!(engine.graph().depth_of(&c), Some(2));
}
