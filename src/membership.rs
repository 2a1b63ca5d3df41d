// Copyright (c) 2026 Treecast
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Root-side membership engine: Register -> Advertise -> Join
//! choreography, and the reunion-timeout sweeper. Spec §4.4.
//!
//! The engine is the sole mutator of the registration table, the
//! reunion-timestamp map, and (via `&mut NetworkGraph`) the tree; the
//! main loop owns all three and is the only caller (spec §5, §9).

use crate::address::Address;
use crate::graph::NetworkGraph;
use crate::link::LinkTable;
use crate::wire::{self, Packet, PacketType, ReunionOp};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Membership-engine errors (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// Advertise REQ from a peer that never completed Register.
    #[error("peer not registered")]
    NotRegistered,
    /// A Reunion RES next hop is not a current neighbor.
    #[error("unknown neighbor")]
    UnknownNeighbor,
    /// Frame body failed to parse for its declared type.
    #[error("malformed body")]
    MalformedBody,
}

/// Root-side membership state: who has registered, the topology, and the
/// most recent reunion-hello time per originating address.
pub struct MembershipEngine {
    registered: BTreeSet<Address>,
    graph: NetworkGraph,
    last_hello_at: BTreeMap<Address, Instant>,
}

impl MembershipEngine {
    /// Create a new engine rooted at `root`.
    pub fn new(root: Address) -> Self {
        Self {
            registered: BTreeSet::new(),
            graph: NetworkGraph::new(root),
            last_hello_at: BTreeMap::new(),
        }
    }

    /// Shared read access to the tree (e.g. for metrics).
    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    /// Dispatch an inbound frame by type. Enqueues any response onto
    /// `links`. Join and Message are not expected at the root and are
    /// ignored (logged at `debug`).
    pub fn handle_frame(
        &mut self,
        pkt: &Packet,
        links: &mut LinkTable,
        now: Instant,
    ) -> Result<(), MembershipError> {
        match pkt.ptype {
            PacketType::Register => self.handle_register(pkt, links),
            PacketType::Advertise => self.handle_advertise(pkt, links),
            PacketType::Reunion => self.handle_reunion(pkt, links, now),
            PacketType::Join | PacketType::Message => {
                debug!(src = %pkt.src, ptype = ?pkt.ptype, "frame not expected at root, ignored");
                Ok(())
            }
        }
    }

    fn handle_register(
        &mut self,
        pkt: &Packet,
        links: &mut LinkTable,
    ) -> Result<(), MembershipError> {
        let body = wire::parse_register_body(&pkt.body).map_err(|_| MembershipError::MalformedBody)?;
        if let wire::RegisterBody::Req(requester) = body {
            // Idempotent: inserting an already-present address is a no-op.
            self.registered.insert(requester.clone());
            links.add(requester.clone(), true);
            links.enqueue(&requester, wire::encode_register_res_ack(self.graph.root()));
            info!(peer = %requester, "registered");
        }
        Ok(())
    }

    fn handle_advertise(
        &mut self,
        pkt: &Packet,
        links: &mut LinkTable,
    ) -> Result<(), MembershipError> {
        if !self.registered.contains(&pkt.src) {
            warn!(peer = %pkt.src, "advertise from unregistered peer refused");
            return Err(MembershipError::NotRegistered);
        }
        let parent = self
            .graph
            .find_live_node(&pkt.src)
            .map_err(|_| MembershipError::UnknownNeighbor)?;
        // REDESIGN FLAG 1 (see DESIGN.md): a peer re-advertising after a
        // reunion failure is assigned a new parent unconditionally; its
        // old subtree, if any, is left attached until the sweeper reaps
        // it by timeout.
        self.graph
            .add(pkt.src.clone(), &parent)
            .map_err(|_| MembershipError::UnknownNeighbor)?;
        links.enqueue(
            &pkt.src,
            wire::encode_advertise_res(self.graph.root(), &parent),
        );
        info!(peer = %pkt.src, parent = %parent, "advertised");
        Ok(())
    }

    fn handle_reunion(
        &mut self,
        pkt: &Packet,
        links: &mut LinkTable,
        now: Instant,
    ) -> Result<(), MembershipError> {
        let (op, path) = wire::parse_reunion_body(&pkt.body).map_err(|_| MembershipError::MalformedBody)?;
        match op {
            ReunionOp::Req => {
                let Some(originator) = path.first().cloned() else {
                    return Err(MembershipError::MalformedBody);
                };
                self.last_hello_at.insert(originator.clone(), now);
                self.graph.turn_on(&originator);
                // reply to the node adjacent to the root on the path
                let Some(adjacent) = path.last().cloned() else {
                    return Err(MembershipError::MalformedBody);
                };
                let mut reversed = path.clone();
                reversed.reverse();
                links.enqueue(
                    &adjacent,
                    wire::encode_reunion(self.graph.root(), ReunionOp::Res, &reversed),
                );
                debug!(originator = %originator, "reunion hello received");
                Ok(())
            }
            ReunionOp::Res => {
                // REDESIGN FLAG 3: explicitly ignored, not a fallthrough.
                debug!(src = %pkt.src, "reunion RES at root ignored");
                Ok(())
            }
        }
    }

    /// Sweep for timed-out originators: any address whose last reunion
    /// hello is older than `fail_window`, relative to `now`, has its
    /// subtree removed. Returns the addresses that were reaped.
    pub fn sweep_timeouts(&mut self, now: Instant, fail_window: Duration) -> Vec<Address> {
        let stale: Vec<Address> = self
            .last_hello_at
            .iter()
            .filter(|(_, &t)| now.saturating_duration_since(t) > fail_window)
            .map(|(a, _)| a.clone())
            .collect();
        for addr in &stale {
            warn!(peer = %addr, "reunion timeout, removing subtree");
            self.graph.remove_subtree(addr);
            self.last_hello_at.remove(addr);
        }
        stale
    }

    /// True if `addr` completed Register.
    pub fn is_registered(&self, addr: &Address) -> bool {
        self.registered.contains(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_frame;

    fn a(port: u16) -> Address {
        Address::parse_with_port("127.0.0.1", port).unwrap()
    }

    #[test]
    fn register_then_advertise_happy_path() {
        let root = a(3652);
        let client = a(35315);
        let mut engine = MembershipEngine::new(root.clone());
        let mut links = LinkTable::new();

        let req = wire::encode_register_req(&client, &client);
        let pkt = decode_frame(req).unwrap();
        engine.handle_frame(&pkt, &mut links, Instant::now()).unwrap();
        assert!(engine.is_registered(&client));
        assert!(links.is_registration_link(&client));

        let adv = wire::encode_advertise_req(&client);
        let pkt = decode_frame(adv).unwrap();
        engine.handle_frame(&pkt, &mut links, Instant::now()).unwrap();
        assert_eq!(engine.graph().find(&client), Some(&client));
        assert_eq!(engine.graph().depth_of(&client), Some(1));
    }

    #[test]
    fn advertise_without_register_is_refused() {
        let root = a(1);
        let client = a(2);
        let mut engine = MembershipEngine::new(root);
        let mut links = LinkTable::new();
        let adv = wire::encode_advertise_req(&client);
        let pkt = decode_frame(adv).unwrap();
        let err = engine.handle_frame(&pkt, &mut links, Instant::now()).unwrap_err();
        assert_eq!(err, MembershipError::NotRegistered);
        assert!(!engine.graph().contains(&client));
    }

    #[test]
    fn reunion_req_updates_timestamp_and_replies_reversed() {
        let root = a(1);
        let a1 = a(2);
        let originator = a(3);
        let mut engine = MembershipEngine::new(root.clone());
        let mut links = LinkTable::new();
        links.add(a1.clone(), false);

        let path = vec![originator.clone(), a1.clone()];
        let frame = wire::encode_reunion(&originator, ReunionOp::Req, &path);
        let pkt = decode_frame(frame).unwrap();
        engine.handle_frame(&pkt, &mut links, Instant::now()).unwrap();

        assert!(engine.graph().is_alive(&originator) || !engine.graph().contains(&originator));
        // response enqueued to a1, reversed path [a1, originator]
        struct Capture(Vec<(Address, usize)>);
        impl crate::link::FrameSender for Capture {
            fn send(&mut self, addr: &Address, frames: &[bytes::Bytes]) -> Result<(), ()> {
                self.0.push((addr.clone(), frames.len()));
                Ok(())
            }
        }
        let mut cap = Capture(Vec::new());
        links.flush_all(&mut cap);
        assert_eq!(cap.0, vec![(a1, 1)]);
    }

    #[test]
    fn sweep_removes_stale_originator_subtree() {
        let root = a(1);
        let mut engine = MembershipEngine::new(root.clone());
        let a1 = a(2);
        engine.graph.add(a1.clone(), &root).unwrap();
        let mut links = LinkTable::new();
        let path = vec![a1.clone()];
        let frame = wire::encode_reunion(&a1, ReunionOp::Req, &path);
        let pkt = decode_frame(frame).unwrap();
        let t0 = Instant::now();
        engine.handle_frame(&pkt, &mut links, t0).unwrap();

        let later = t0 + Duration::from_secs(100);
        let reaped = engine.sweep_timeouts(later, Duration::from_secs(32));
        assert_eq!(reaped, vec![a1.clone()]);
        assert!(!engine.graph().contains(&a1));
    }

    #[test]
    fn sweep_reaps_at_half_the_fail_window() {
        // Spec §4.4/§5 and scenario 6: the root sweeper compares against
        // T_fail/2, not T_fail, so a 20s silence must already be reaped
        // against a 16s threshold (T_fail/2 for a 32s T_fail) even though
        // it is well under the full 32s window.
        let root = a(1);
        let mut engine = MembershipEngine::new(root.clone());
        let a1 = a(2);
        engine.graph.add(a1.clone(), &root).unwrap();
        let mut links = LinkTable::new();
        let path = vec![a1.clone()];
        let frame = wire::encode_reunion(&a1, ReunionOp::Req, &path);
        let pkt = decode_frame(frame).unwrap();
        let t0 = Instant::now();
        engine.handle_frame(&pkt, &mut links, t0).unwrap();

        let later = t0 + Duration::from_secs(20);
        let sweep_threshold = Duration::from_secs(32) / 2;
        let reaped = engine.sweep_timeouts(later, sweep_threshold);
        assert_eq!(reaped, vec![a1.clone()]);
        assert!(!engine.graph().contains(&a1));
    }
}
