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

//! Observability surface (spec §9 Non-goal: metrics themselves are out
//! of scope for the protocol, but the ambient operational stack still
//! exposes them the way the rest of this codebase does).

use axum::{routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A prometheus registration or encode call failed.
    #[error("prometheus")]
    Prom,
    /// The metrics HTTP listener failed to bind.
    #[error("bind failed")]
    Bind,
}

/// Process-wide metrics container, registered once at startup and
/// shared behind an `Arc` with the dispatcher and transport tasks.
#[derive(Clone)]
pub struct Metrics {
    /// Registry handed to the `/metrics` HTTP handler.
    pub registry: Registry,

    /// Current tree node count (root only; 0 on clients).
    pub graph_nodes: IntGauge,
    /// Current maximum tree depth (root only).
    pub graph_depth_max: IntGauge,
    /// Reunion timeouts observed, cumulative.
    pub reunion_timeouts_total: IntCounter,
    /// Currently open entries in the link table.
    pub peer_links_active: IntGauge,
    /// Frames dropped for failing to decode.
    pub frames_malformed_total: IntCounter,
    /// Frames dropped for referencing an unknown peer.
    pub frames_dropped_unknown_peer_total: IntCounter,
    /// Broadcast messages forwarded to tree neighbors.
    pub broadcasts_forwarded_total: IntCounter,
}

impl Metrics {
    /// Create and register all metrics against a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let graph_nodes = IntGauge::new("treecast_graph_nodes", "Nodes currently in the tree")
            .map_err(|_| MetricsError::Prom)?;
        let graph_depth_max = IntGauge::new("treecast_graph_depth_max", "Current maximum tree depth")
            .map_err(|_| MetricsError::Prom)?;
        let reunion_timeouts_total = IntCounter::new(
            "treecast_reunion_timeouts_total",
            "Reunion timeouts observed",
        )
        .map_err(|_| MetricsError::Prom)?;
        let peer_links_active =
            IntGauge::new("treecast_peer_links_active", "Open entries in the link table")
                .map_err(|_| MetricsError::Prom)?;
        let frames_malformed_total = IntCounter::new(
            "treecast_frames_malformed_total",
            "Frames dropped for failing to decode",
        )
        .map_err(|_| MetricsError::Prom)?;
        let frames_dropped_unknown_peer_total = IntCounter::new(
            "treecast_frames_dropped_unknown_peer_total",
            "Frames dropped for referencing an unknown peer",
        )
        .map_err(|_| MetricsError::Prom)?;
        let broadcasts_forwarded_total = IntCounter::new(
            "treecast_broadcasts_forwarded_total",
            "Broadcast messages forwarded to tree neighbors",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(graph_nodes.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(graph_depth_max.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(reunion_timeouts_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(peer_links_active.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(frames_malformed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(frames_dropped_unknown_peer_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(broadcasts_forwarded_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            graph_nodes,
            graph_depth_max,
            reunion_timeouts_total,
            peer_links_active,
            frames_malformed_total,
            frames_dropped_unknown_peer_total,
            broadcasts_forwarded_total,
        })
    }

    fn encode(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf).ok();
        String::from_utf8(buf).unwrap_or_default()
    }
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<Arc<Metrics>>,
) -> String {
    metrics.encode()
}

/// Serve `/metrics` on `listen_addr` ("ip:port") until the process
/// exits. Spawned as its own task; a bind failure is reported back to
/// the caller rather than panicking the task.
pub async fn serve(listen_addr: &str, metrics: Arc<Metrics>) -> Result<(), MetricsError> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|_| MetricsError::Bind)?;
    info!(addr = listen_addr, "metrics endpoint listening");
    axum::serve(listener, app)
        .await
        .map_err(|_| MetricsError::Bind)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_error() {
        let m = Metrics::new().unwrap();
        m.graph_nodes.set(3);
        m.reunion_timeouts_total.inc();
        let text = m.encode();
        assert!(text.contains("treecast_graph_nodes"));
        assert!(text.contains("treecast_reunion_timeouts_total"));
    }
}
