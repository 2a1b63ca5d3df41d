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

//! Client-side peer state machine: join handshake, parent/child
//! maintenance, broadcast forwarding, and the reunion hello/hello-back
//! loop with failure-recovery re-advertise. Spec §4.5.

use crate::address::Address;
use crate::link::LinkTable;
use crate::wire::{self, AdvertiseBody, Packet, PacketType, RegisterBody, ReunionOp};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Maximum children a client peer accepts (mirrors `graph::MAX_CHILDREN`;
/// the peer only ever learns of its own two slots, never the full tree).
pub const MAX_CHILDREN: usize = 2;

/// States named in spec §4.5. `Joining` is folded into the transition
/// from `AwaitingAdvertise` to `Connected` (the Join send is a single
/// synchronous step with no observable intermediate frame exchange), and
/// `ReunionPending` is represented by `Connected { awaiting_hello_back:
/// true }` rather than a distinct variant, since every other field of
/// `Connected` state remains live while a hello is outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing sent yet.
    Unregistered,
    /// Register REQ sent, RES ACK not yet observed.
    RegisterPending,
    /// Register RES ACK observed, Advertise REQ sent.
    AwaitingAdvertise,
    /// Parent assigned, tree link open, reunion loop running.
    Connected,
    /// Reunion hello timed out; re-advertising.
    ReunionFailed,
}

/// Peer state-machine errors (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// Message or Reunion-RES next hop is not a current neighbor.
    #[error("unknown neighbor")]
    UnknownNeighbor,
    /// Register RES body was not "ACK"; fatal at the client.
    #[error("register response was not ACK")]
    RegisterNotAck,
    /// Frame body failed to parse for its declared type.
    #[error("malformed body")]
    MalformedBody,
}

/// Client-local peer state (spec §3 "Peer-local state").
pub struct PeerState {
    self_addr: Address,
    root_addr: Address,
    state: ClientState,
    parent_address: Option<Address>,
    children_addresses: Vec<Address>,
    awaiting_hello_back: bool,
    last_hello_sent_at: Option<Instant>,
}

impl PeerState {
    /// Create a fresh, unregistered peer knowing only its own and the
    /// root's address.
    pub fn new(self_addr: Address, root_addr: Address) -> Self {
        Self {
            self_addr,
            root_addr,
            state: ClientState::Unregistered,
            parent_address: None,
            children_addresses: Vec::new(),
            awaiting_hello_back: false,
            last_hello_sent_at: None,
        }
    }

    /// Current state, for diagnostics/tests.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Current parent, if any.
    pub fn parent(&self) -> Option<&Address> {
        self.parent_address.as_ref()
    }

    /// Current children, in join order.
    pub fn children(&self) -> &[Address] {
        &self.children_addresses
    }

    /// A client in `Connected` state has a parent and exactly one
    /// registration link to root (spec §8 invariant).
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected && self.parent_address.is_some()
    }

    /// Command: `Register`. Sends Register REQ to root over the
    /// registration link; does not change state (retries are
    /// user-driven).
    pub fn command_register(&mut self, links: &mut LinkTable) {
        links.add(self.root_addr.clone(), true);
        links.enqueue(
            &self.root_addr,
            wire::encode_register_req(&self.self_addr, &self.self_addr),
        );
        self.state = ClientState::RegisterPending;
    }

    /// Command: `Advertise`. Sends Advertise REQ to root over the
    /// registration link directly (used both for the first advertise and
    /// for reunion-failure recovery).
    pub fn command_advertise(&mut self, links: &mut LinkTable) {
        links.add(self.root_addr.clone(), true);
        links.enqueue(&self.root_addr, wire::encode_advertise_req(&self.self_addr));
        self.state = ClientState::AwaitingAdvertise;
    }

    /// Command: `SendMessage`. Broadcasts `payload` to parent and every
    /// child.
    pub fn command_send_message(&self, payload: &[u8], links: &mut LinkTable) {
        let frame = wire::encode_message(&self.self_addr, payload);
        for neighbor in links.tree_neighbors() {
            links.enqueue(&neighbor, frame.clone());
        }
    }

    /// Dispatch an inbound frame by type.
    pub fn handle_frame(&mut self, pkt: &Packet, links: &mut LinkTable) -> Result<(), PeerError> {
        match pkt.ptype {
            PacketType::Register => self.handle_register_res(pkt),
            PacketType::Advertise => self.handle_advertise_res(pkt, links),
            PacketType::Join => self.handle_join(pkt, links),
            PacketType::Message => self.handle_message(pkt, links),
            PacketType::Reunion => self.handle_reunion(pkt, links),
        }
    }

    fn handle_register_res(&mut self, pkt: &Packet) -> Result<(), PeerError> {
        let body = wire::parse_register_body(&pkt.body).map_err(|_| PeerError::MalformedBody)?;
        match body {
            RegisterBody::ResAck => {
                info!("register acked");
                Ok(())
            }
            RegisterBody::Req(_) => Err(PeerError::RegisterNotAck),
        }
    }

    fn handle_advertise_res(
        &mut self,
        pkt: &Packet,
        links: &mut LinkTable,
    ) -> Result<(), PeerError> {
        let body = wire::parse_advertise_body(&pkt.body).map_err(|_| PeerError::MalformedBody)?;
        let AdvertiseBody::Res(parent) = body else {
            return Ok(());
        };
        self.parent_address = Some(parent.clone());
        links.add(parent.clone(), false);
        links.enqueue(&parent, wire::encode_join(&self.self_addr));
        self.state = ClientState::Connected;
        self.awaiting_hello_back = false;
        info!(parent = %parent, "advertised, joined parent");
        Ok(())
    }

    fn handle_join(&mut self, pkt: &Packet, links: &mut LinkTable) -> Result<(), PeerError> {
        wire::parse_join_body(&pkt.body).map_err(|_| PeerError::MalformedBody)?;
        if self.children_addresses.contains(&pkt.src) {
            return Ok(()); // idempotent
        }
        if self.children_addresses.len() >= MAX_CHILDREN {
            warn!(child = %pkt.src, "join rejected, already have max children");
            return Ok(()); // reject silently
        }
        self.children_addresses.push(pkt.src.clone());
        links.add(pkt.src.clone(), false);
        info!(child = %pkt.src, "child joined");
        Ok(())
    }

    fn handle_message(&self, pkt: &Packet, links: &mut LinkTable) -> Result<(), PeerError> {
        let is_known = self.parent_address.as_ref() == Some(&pkt.src)
            || self.children_addresses.contains(&pkt.src);
        if !is_known {
            warn!(src = %pkt.src, "message from unknown source dropped");
            return Err(PeerError::UnknownNeighbor);
        }
        if links.is_registration_link(&pkt.src) {
            // Should never happen (registration links never carry
            // Message), but defends the invariant explicitly.
            return Err(PeerError::UnknownNeighbor);
        }
        let frame = wire::encode_message(&self.self_addr, &pkt.body);
        for neighbor in links.tree_neighbors() {
            if neighbor != pkt.src {
                links.enqueue(&neighbor, frame.clone());
            }
        }
        Ok(())
    }

    fn handle_reunion(&mut self, pkt: &Packet, links: &mut LinkTable) -> Result<(), PeerError> {
        let (op, path) = wire::parse_reunion_body(&pkt.body).map_err(|_| PeerError::MalformedBody)?;
        match op {
            ReunionOp::Req => {
                let Some(parent) = self.parent_address.clone() else {
                    return Err(PeerError::UnknownNeighbor);
                };
                let mut forwarded = path;
                forwarded.push(self.self_addr.clone());
                links.enqueue(&parent, wire::encode_reunion(&self.self_addr, ReunionOp::Req, &forwarded));
                Ok(())
            }
            ReunionOp::Res => {
                let Some(head) = path.first() else {
                    return Err(PeerError::MalformedBody);
                };
                if head != &self.self_addr {
                    return Err(PeerError::UnknownNeighbor);
                }
                if path.len() == 1 {
                    // A stray RES after recovery already rearmed via a
                    // fresh Advertise; clearing here is harmless either way.
                    self.awaiting_hello_back = false;
                    return Ok(());
                }
                let remaining = &path[1..];
                let next_hop = remaining[0].clone();
                if !links.contains(&next_hop) || links.is_registration_link(&next_hop) {
                    return Err(PeerError::UnknownNeighbor);
                }
                links.enqueue(
                    &next_hop,
                    wire::encode_reunion(&self.self_addr, ReunionOp::Res, remaining),
                );
                Ok(())
            }
        }
    }

    /// One reunion-loop tick (spec §4.5). If not awaiting a hello-back,
    /// sends a fresh hello no more often than every `hello_interval`. If
    /// awaiting one and `fail_window` has elapsed since it was sent,
    /// declares failure and re-advertises.
    pub fn reunion_tick(
        &mut self,
        now: Instant,
        hello_interval: Duration,
        fail_window: Duration,
        links: &mut LinkTable,
    ) {
        if self.state != ClientState::Connected {
            return;
        }
        if !self.awaiting_hello_back {
            let due = self
                .last_hello_sent_at
                .map(|sent_at| now.saturating_duration_since(sent_at) >= hello_interval)
                .unwrap_or(true);
            if !due {
                return;
            }
            let Some(parent) = self.parent_address.clone() else {
                return;
            };
            links.enqueue(
                &parent,
                wire::encode_reunion(&self.self_addr, ReunionOp::Req, &[self.self_addr.clone()]),
            );
            self.awaiting_hello_back = true;
            self.last_hello_sent_at = Some(now);
            return;
        }
        if let Some(sent_at) = self.last_hello_sent_at {
            if now.saturating_duration_since(sent_at) > fail_window {
                warn!("reunion hello timed out, declaring failure and re-advertising");
                self.state = ClientState::ReunionFailed;
                self.awaiting_hello_back = false;
                self.command_advertise(links);
            }
        }
    }
}
