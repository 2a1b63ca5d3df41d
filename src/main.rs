#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Treecast node entrypoint (systemd-friendly).
//! Loads configuration and runs until shutdown.

use std::path::Path;

use tracing::error;
use treecast::config::{NodeConfig, RawConfig};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Extract node index from a path like `/srv/treecast/node3/data`.
fn node_index_from_data_dir(data_dir: &str) -> u16 {
    for part in Path::new(data_dir).components() {
        let s = part.as_os_str().to_string_lossy();
        if let Some(rest) = s.strip_prefix("node") {
            if let Ok(n) = rest.parse::<u16>() {
                if (1..=99).contains(&n) {
                    return n;
                }
            }
        }
    }
    1
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    if let Ok(path) = std::env::var("TREECAST_CONFIG") {
        match NodeConfig::load(&path) {
            Ok(cfg) => {
                if let Err(e) = treecast::node::run(cfg).await {
                    error!(err = %e, "node exited with error");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let data_dir = env("TREECAST_DATA_DIR", "./data");
    let node_idx = node_index_from_data_dir(&data_dir);
    let bind_port = 4000 + node_idx;
    let is_root = node_idx == 1;

    let raw = RawConfig {
        bind_ip: env("TREECAST_BIND_IP", "0.0.0.0"),
        bind_port,
        is_root,
        root_ip: if is_root {
            None
        } else {
            Some(env("TREECAST_ROOT_IP", "127.0.0.1"))
        },
        root_port: if is_root { None } else { Some(4001) },
        hello_interval_secs: 4,
        fail_window_secs: 32,
        sweep_interval_secs: 0,
        tick_interval_millis: 2000,
        metrics_listen_addr: std::env::var("TREECAST_METRICS_ADDR").ok(),
    };

    let cfg = match NodeConfig::from_env(raw) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = treecast::node::run(cfg).await {
        error!(err = %e, "node exited with error");
        std::process::exit(1);
    }
}
