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

//! The main loop (spec §4.6, §5, §9): the sole mutator of peer/root
//! state. Each tick, in order: drain inbound frames, drain commands
//! (client side) or sweep reunion timeouts (root side), then flush the
//! link table's outbound queues. Spec §5 describes the Main Loop and
//! Reunion Daemon as two logical activities; here both are folded into
//! one self-paced tick (`on_tick`), driven by `crate::node`'s single
//! ticker, rather than split across a second channel-fed task — the
//! daemon's only real job (emit a hello / sweep for timeouts on a
//! period) is itself idempotent per call, so a shared tick satisfies
//! the same ordering and mutual-exclusion guarantees with one fewer
//! task.

use crate::command::Command;
use crate::graph::NetworkGraph;
use crate::link::{FrameSender, LinkTable};
use crate::membership::MembershipEngine;
use crate::peer::PeerState;
use crate::transport::InboundFrame;
use crate::wire::{self, PacketType};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Role-specific state a dispatch step mutates. The root runs a
/// `MembershipEngine`; a client runs a `PeerState`. Both share a
/// `LinkTable` and a `FrameSender`.
pub enum Role {
    /// Root-side membership engine.
    Root(MembershipEngine),
    /// Client-side peer state machine.
    Client(PeerState),
}

impl Role {
    /// Shared read access to the tree, for metrics. Only meaningful at
    /// the root; clients have no tree view and return `None`.
    pub fn graph(&self) -> Option<&NetworkGraph> {
        match self {
            Role::Root(engine) => Some(engine.graph()),
            Role::Client(_) => None,
        }
    }
}

/// Everything one dispatch tick needs: the role state, the outbound
/// link table, and the socket sender used to flush it.
pub struct Dispatcher {
    role: Role,
    links: LinkTable,
    hello_interval: Duration,
    fail_window: Duration,
    sweep_interval: Duration,
    sweep_threshold: Duration,
    last_sweep_at: Instant,
    malformed_count: u64,
    unknown_peer_count: u64,
    broadcasts_forwarded_count: u64,
    reunion_timeouts_count: u64,
}

/// Event counts accumulated since the last `take_counters` call, for the
/// caller (`crate::node`) to fold into `crate::metrics::Metrics`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCounters {
    /// Frames dropped for failing to decode.
    pub malformed: u64,
    /// Frames dropped for referencing an unknown peer.
    pub unknown_peer: u64,
    /// Broadcasts forwarded to tree neighbors.
    pub broadcasts_forwarded: u64,
    /// Reunion timeouts reaped by the root sweeper.
    pub reunion_timeouts: u64,
}

impl Dispatcher {
    /// Build a dispatcher for a given role.
    pub fn new(
        role: Role,
        hello_interval: Duration,
        fail_window: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            role,
            links: LinkTable::new(),
            hello_interval,
            fail_window,
            sweep_interval,
            // Spec §4.4/§5: the root sweeper's staleness threshold is
            // T_fail/2, not T_fail (Concrete Scenario 6; original
            // source's `self.time_out_limit / 2`).
            sweep_threshold: fail_window / 2,
            last_sweep_at: Instant::now(),
            malformed_count: 0,
            unknown_peer_count: 0,
            broadcasts_forwarded_count: 0,
            reunion_timeouts_count: 0,
        }
    }

    /// Drain and reset the accumulated event counters.
    pub fn take_counters(&mut self) -> DispatchCounters {
        let counters = DispatchCounters {
            malformed: self.malformed_count,
            unknown_peer: self.unknown_peer_count,
            broadcasts_forwarded: self.broadcasts_forwarded_count,
            reunion_timeouts: self.reunion_timeouts_count,
        };
        self.malformed_count = 0;
        self.unknown_peer_count = 0;
        self.broadcasts_forwarded_count = 0;
        self.reunion_timeouts_count = 0;
        counters
    }

    /// Read access to the link table, for metrics (active link count).
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Read access to the role, for metrics.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Drain `inbound`, decoding and dispatching each frame to the
    /// active role. Decode failures and handler errors are logged and
    /// otherwise ignored — a malformed or rejected frame never panics
    /// the loop (spec §7).
    pub fn drain_inbound(&mut self, inbound: &[InboundFrame], now: Instant) {
        for frame in inbound {
            let pkt = match wire::decode_frame(frame.bytes.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(from = %frame.from, err = %e, "dropping malformed frame");
                    self.malformed_count += 1;
                    continue;
                }
            };
            let ptype = pkt.ptype;
            let is_client = matches!(self.role, Role::Client(_));
            let was_message = is_client && ptype == PacketType::Message;
            let result = match &mut self.role {
                Role::Root(engine) => engine
                    .handle_frame(&pkt, &mut self.links, now)
                    .map_err(|e| {
                        let unknown = matches!(e, crate::membership::MembershipError::UnknownNeighbor);
                        (e.to_string(), unknown)
                    }),
                Role::Client(peer) => peer.handle_frame(&pkt, &mut self.links).map_err(|e| {
                    let unknown = matches!(e, crate::peer::PeerError::UnknownNeighbor);
                    (e.to_string(), unknown)
                }),
            };
            match result {
                Ok(()) => {
                    if was_message {
                        self.broadcasts_forwarded_count += 1;
                    }
                }
                Err((msg, unknown)) => {
                    if unknown {
                        self.unknown_peer_count += 1;
                    }
                    debug!(src = %pkt.src, ptype = ?ptype, err = %msg, "frame handler rejected");
                }
            }
        }
    }

    /// Drain queued client commands. A no-op when running as root — the
    /// command surface (spec §6) is client-only.
    pub fn drain_commands(&mut self, commands: &[Command]) {
        let Role::Client(peer) = &mut self.role else {
            if !commands.is_empty() {
                debug!("commands ignored at root");
            }
            return;
        };
        for cmd in commands {
            match cmd {
                Command::Register => peer.command_register(&mut self.links),
                Command::Advertise => peer.command_advertise(&mut self.links),
                Command::SendMessage(payload) => {
                    peer.command_send_message(payload.as_bytes(), &mut self.links)
                }
            }
        }
    }

    /// Role-specific periodic maintenance: at the root, sweep for
    /// reunion timeouts no more often than `sweep_interval`; at a
    /// client, emit a reunion hello (or check for one overdue) every
    /// tick, which internally paces itself against `hello_interval`.
    pub fn on_tick(&mut self, now: Instant) {
        match &mut self.role {
            Role::Root(engine) => {
                if now.saturating_duration_since(self.last_sweep_at) >= self.sweep_interval {
                    let reaped = engine.sweep_timeouts(now, self.sweep_threshold);
                    self.reunion_timeouts_count += reaped.len() as u64;
                    for addr in reaped {
                        debug!(peer = %addr, "reaped by sweep");
                    }
                    self.last_sweep_at = now;
                }
            }
            Role::Client(peer) => {
                peer.reunion_tick(now, self.hello_interval, self.fail_window, &mut self.links);
            }
        }
    }

    /// Flush every queued outbound frame through `sender`. Registration
    /// links and tree links are both flushed; failed sends drop the
    /// link from the table (spec §4.2).
    pub fn flush(&mut self, sender: &mut dyn FrameSender) {
        self.links.flush_all(sender);
    }
}
