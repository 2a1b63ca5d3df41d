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

//! Node assembly: wires configuration, transport, the command reader,
//! and the dispatcher's main loop together, and runs until a shutdown
//! signal arrives (spec §4.6, §5, §9).

use crate::command::{self, Command};
use crate::config::NodeConfig;
use crate::dispatcher::{Dispatcher, Role};
use crate::membership::MembershipEngine;
use crate::metrics::Metrics;
use crate::peer::PeerState;
use crate::transport::{self, InboundFrame, TcpFrameSender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Run a node to completion (i.e. until `Ctrl-C`/SIGTERM), per `cfg`.
pub async fn run(cfg: NodeConfig) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new().map_err(|_| anyhow::anyhow!("metrics init failed"))?);

    if let Some(listen_addr) = cfg.metrics_listen_addr.clone() {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(&listen_addr, metrics).await {
                error!(err = %e, "metrics endpoint exited");
            }
        });
    }

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundFrame>(1024);
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);

    {
        let bind_ip = std::net::Ipv4Addr::from(cfg.bind_addr.octets()).to_string();
        let bind_port = cfg.bind_addr.port();
        let tx = inbound_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = transport::run_acceptor(&bind_ip, bind_port, tx).await {
                error!(err = %e, "acceptor exited");
            }
        });
    }

    if !cfg.is_root {
        tokio::spawn(command::run_command_reader(tokio::io::stdin(), command_tx));
    } else {
        drop(command_tx);
    }

    let role = if cfg.is_root {
        info!(addr = %cfg.bind_addr, "starting as root");
        Role::Root(MembershipEngine::new(cfg.root_addr.clone()))
    } else {
        info!(addr = %cfg.bind_addr, root = %cfg.root_addr, "starting as client");
        Role::Client(PeerState::new(cfg.bind_addr.clone(), cfg.root_addr.clone()))
    };

    let mut dispatcher = Dispatcher::new(
        role,
        Duration::from_secs(cfg.hello_interval_secs),
        Duration::from_secs(cfg.fail_window_secs),
        Duration::from_secs(cfg.sweep_interval_secs),
    );
    let mut sender = TcpFrameSender::new();

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_interval_millis));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let mut inbound = Vec::new();
                while let Ok(frame) = inbound_rx.try_recv() {
                    inbound.push(frame);
                }
                let mut commands = Vec::new();
                while let Ok(cmd) = command_rx.try_recv() {
                    commands.push(cmd);
                }

                dispatcher.drain_inbound(&inbound, now);
                dispatcher.drain_commands(&commands);
                dispatcher.on_tick(now);
                dispatcher.flush(&mut sender);

                report_metrics(&mut dispatcher, &metrics);
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received, exiting");
                return Ok(());
            }
        }
    }
}

fn report_metrics(dispatcher: &mut Dispatcher, metrics: &Metrics) {
    metrics.peer_links_active.set(dispatcher.links().len() as i64);
    if let Some(graph) = dispatcher.role().graph() {
        metrics.graph_nodes.set(graph.node_count() as i64);
        metrics.graph_depth_max.set(graph.max_depth() as i64);
    }
    let counters = dispatcher.take_counters();
    metrics.frames_malformed_total.inc_by(counters.malformed);
    metrics
        .frames_dropped_unknown_peer_total
        .inc_by(counters.unknown_peer);
    metrics
        .broadcasts_forwarded_total
        .inc_by(counters.broadcasts_forwarded);
    metrics
        .reunion_timeouts_total
        .inc_by(counters.reunion_timeouts);
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
