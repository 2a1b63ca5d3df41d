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

//! Peer link table: per-remote-address outbound byte queues, tagged as a
//! registration link (to root, Register/Advertise only) or a tree link
//! (Join/Message/Reunion). Spec §4.2.

use crate::address::Address;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Link table errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Outbound socket send failed; the link has been removed.
    #[error("send failed, link removed")]
    SendFailure,
}

struct LinkState {
    queue: Vec<Bytes>,
    is_registration_link: bool,
}

/// A transport send function: given an address and a batch of frames,
/// attempt delivery. Returns `Ok(())` on success or `Err(())` on any
/// failure (the concrete transport collaborator owns retry policy, if
/// any — the link table's contract is simply "remove on failure").
pub trait FrameSender {
    /// Attempt to send `frames` to `addr`.
    fn send(&mut self, addr: &Address, frames: &[Bytes]) -> Result<(), ()>;
}

/// Keyed by canonical address for deterministic iteration order, the same
/// shape as the teacher's peer-scoring table.
#[derive(Default)]
pub struct LinkTable {
    links: BTreeMap<Address, LinkState>,
}

impl LinkTable {
    /// Construct an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link to `addr`, flagged as registration or tree. A
    /// second `add` for an existing address updates the flag and leaves
    /// the queue untouched.
    pub fn add(&mut self, addr: Address, registration: bool) {
        self.links
            .entry(addr)
            .and_modify(|l| l.is_registration_link = registration)
            .or_insert(LinkState {
                queue: Vec::new(),
                is_registration_link: registration,
            });
    }

    /// Remove a link outright (e.g. after subtree takedown).
    pub fn remove(&mut self, addr: &Address) {
        self.links.remove(addr);
    }

    /// True if a link to `addr` is known.
    pub fn contains(&self, addr: &Address) -> bool {
        self.links.contains_key(addr)
    }

    /// True if the known link to `addr` is a registration link.
    pub fn is_registration_link(&self, addr: &Address) -> bool {
        self.links
            .get(addr)
            .map(|l| l.is_registration_link)
            .unwrap_or(false)
    }

    /// Enqueue a frame for `addr`. No-op if `addr` is unknown to the
    /// table (spec §4.2).
    pub fn enqueue(&mut self, addr: &Address, frame: Bytes) {
        if let Some(link) = self.links.get_mut(addr) {
            link.queue.push(frame);
        }
    }

    /// Addresses of every tree (non-registration) link, in canonical
    /// iteration order. Used for broadcast fan-out.
    pub fn tree_neighbors(&self) -> Vec<Address> {
        self.links
            .iter()
            .filter(|(_, l)| !l.is_registration_link)
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Number of known links (tree + registration).
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if no links are known.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Flush every queue through `sender`, clearing queues that sent
    /// successfully and removing links whose send failed.
    pub fn flush_all(&mut self, sender: &mut dyn FrameSender) {
        self.flush_matching(sender, |_| true);
    }

    /// Flush only queues belonging to registration links.
    pub fn flush_registration_only(&mut self, sender: &mut dyn FrameSender) {
        self.flush_matching(sender, |l| l.is_registration_link);
    }

    fn flush_matching(&mut self, sender: &mut dyn FrameSender, keep: impl Fn(&LinkState) -> bool) {
        let mut failed: Vec<Address> = Vec::new();
        for (addr, link) in self.links.iter_mut() {
            if link.queue.is_empty() || !keep(link) {
                continue;
            }
            match sender.send(addr, &link.queue) {
                Ok(()) => link.queue.clear(),
                Err(()) => {
                    warn!(%addr, "outbound send failed, removing link");
                    failed.push(addr.clone());
                }
            }
        }
        for addr in failed {
            self.links.remove(&addr);
        }
    }
}
