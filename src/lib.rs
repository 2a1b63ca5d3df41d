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

//! Treecast - a peer-to-peer overlay broadcast tree.
//!
//! This crate provides:
//! - A fixed wire codec for the five control/data message types
//! - A root-side membership engine (Register, Advertise, Reunion, sweep)
//! - A client-side peer state machine (join handshake, message relay,
//!   reunion hello loop with automatic re-advertise on failure)
//! - A depth-bounded BFS tree builder capping every node at two children
//! - A thin raw-TCP transport and stdin command surface
//! - Monitoring via Prometheus metrics and structured logging

/// Canonical peer addressing.
pub mod address;
/// Wire codec: envelope header and per-type body encode/decode.
pub mod wire;
/// Per-peer outbound frame queues.
pub mod link;
/// The broadcast tree: depth-bounded placement and subtree takedown.
pub mod graph;
/// Root-side membership engine.
pub mod membership;
/// Client-side peer state machine.
pub mod peer;
/// Main-loop dispatch: inbound frames, commands, and periodic ticks.
pub mod dispatcher;
/// Raw-TCP accept loop and outbound frame sender.
pub mod transport;
/// Stdin command surface.
pub mod command;
/// Configuration loading and validation.
pub mod config;
/// Prometheus metrics and the `/metrics` HTTP endpoint.
pub mod metrics;
/// Node assembly and the top-level run loop.
pub mod node;
