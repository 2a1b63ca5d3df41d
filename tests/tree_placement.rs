use std::time::Instant;
use treecast::address::Address;
use treecast::link::LinkTable;
use treecast::membership::MembershipEngine;
use treecast::wire::{decode_frame, encode_advertise_req, encode_register_req};

fn addr(port: u16) -> Address {
    Address::parse_with_port("127.0.0.1", port).unwrap()
}

fn join(engine: &mut MembershipEngine, links: &mut LinkTable, client: &Address) {
    let reg = decode_frame(encode_register_req(client, client)).unwrap();
    engine.handle_frame(&reg, links, Instant::now()).unwrap();
    let adv = decode_frame(encode_advertise_req(client)).unwrap();
    engine.handle_frame(&adv, links, Instant::now()).unwrap();
}

#[test]
fn six_clients_fill_a_balanced_binary_tree() {
    let root = addr(5000);
    let clients: Vec<Address> = (1..=6).map(|i| addr(5000 + i)).collect();
    let mut engine = MembershipEngine::new(root.clone());
    let mut links = LinkTable::new();

    for c in &clients {
        join(&mut engine, &mut links, c);
    }

    assert_eq!(engine.graph().child_count(&root), Some(2));
    let level1: Vec<&Address> = clients.iter().filter(|c| engine.graph().depth_of(c) == Some(1)).collect();
    assert_eq!(level1.len(), 2);
    for node in &level1 {
        assert_eq!(engine.graph().child_count(node), Some(2));
    }
    let level2: Vec<&Address> = clients.iter().filter(|c| engine.graph().depth_of(c) == Some(2)).collect();
    assert_eq!(level2.len(), 2);

    assert_eq!(engine.graph().max_depth(), 2);
    assert_eq!(engine.graph().node_count(), 7); // root + 6 clients
}

#[test]
fn seventh_client_exceeds_depth_bound_for_six_node_tree() {
    let root = addr(6000);
    let clients: Vec<Address> = (1..=7).map(|i| addr(6000 + i)).collect();
    let mut engine = MembershipEngine::new(root.clone());
    let mut links = LinkTable::new();

    for c in &clients {
        join(&mut engine, &mut links, c);
    }

    // ceil(log2(8)) == 3: the 7th joiner must land at depth <= 3.
    let last = clients.last().unwrap();
    assert!(engine.graph().depth_of(last).unwrap() <= 3);
}
