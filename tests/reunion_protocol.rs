use std::time::{Duration, Instant};
use treecast::address::Address;
use treecast::link::{FrameSender, LinkTable};
use treecast::peer::PeerState;
use treecast::wire::{self, decode_frame};

fn addr(port: u16) -> Address {
    Address::parse_with_port("127.0.0.1", port).unwrap()
}

struct Capture(Vec<(Address, bytes::Bytes)>);
impl FrameSender for Capture {
    fn send(&mut self, addr: &Address, frames: &[bytes::Bytes]) -> Result<(), ()> {
        for f in frames {
            self.0.push((addr.clone(), f.clone()));
        }
        Ok(())
    }
}

fn connected_peer(me: Address, root: Address, parent: Address) -> (PeerState, LinkTable) {
    let mut p = PeerState::new(me, root.clone());
    let mut links = LinkTable::new();
    p.command_register(&mut links);
    let ack = decode_frame(wire::encode_register_res_ack(&root)).unwrap();
    p.handle_frame(&ack, &mut links).unwrap();
    p.command_advertise(&mut links);
    let res = decode_frame(wire::encode_advertise_res(&root, &parent)).unwrap();
    p.handle_frame(&res, &mut links).unwrap();
    (p, links)
}

#[test]
fn reunion_hello_sent_then_echo_clears_awaiting() {
    let root = addr(1);
    let me = addr(2);
    let (mut p, mut links) = connected_peer(me.clone(), root.clone(), root.clone());

    p.reunion_tick(
        Instant::now(),
        Duration::from_secs(4),
        Duration::from_secs(32),
        &mut links,
    );
    let mut cap = Capture(Vec::new());
    links.flush_all(&mut cap);
    assert_eq!(cap.0.len(), 1);
    let (dst, frame) = &cap.0[0];
    assert_eq!(*dst, root);

    let pkt = decode_frame(frame.clone()).unwrap();
    let (_, path) = wire::parse_reunion_body(&pkt.body).unwrap();
    let mut reversed = path.clone();
    reversed.reverse();
    let echo = decode_frame(wire::encode_reunion(&root, wire::ReunionOp::Res, &reversed)).unwrap();
    p.handle_frame(&echo, &mut links).unwrap();
}

#[test]
fn missed_echo_triggers_readvertise() {
    let root = addr(10);
    let me = addr(11);
    let (mut p, mut links) = connected_peer(me.clone(), root.clone(), root.clone());

    let t0 = Instant::now();
    p.reunion_tick(t0, Duration::from_secs(4), Duration::from_secs(4), &mut links);
    assert!(p.is_connected());

    let later = t0 + Duration::from_secs(10);
    p.reunion_tick(later, Duration::from_secs(4), Duration::from_secs(4), &mut links);

    let mut cap = Capture(Vec::new());
    links.flush_all(&mut cap);
    // a re-advertise REQ should have been enqueued to root.
    let advertised = cap.0.iter().any(|(dst, frame)| {
        *dst == root
            && decode_frame(frame.clone())
                .map(|pkt| pkt.ptype == wire::PacketType::Advertise)
                .unwrap_or(false)
    });
    assert!(advertised);
}
