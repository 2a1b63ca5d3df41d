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

//! Per-peer configuration (spec §6): bind address, root role, and the
//! reunion/tick timing knobs spec §9 Open Question 2 asks to expose.

use crate::address::{Address, AddressError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `bind_ip`/`bind_port` failed canonicalization.
    #[error("invalid bind address")]
    InvalidBindAddress(#[source] AddressError),
    /// `is_root` is false but `root_ip`/`root_port` are missing.
    #[error("root address required for a non-root peer")]
    MissingRootAddress,
    /// `root_ip`/`root_port` failed canonicalization.
    #[error("invalid root address")]
    InvalidRootAddress(#[source] AddressError),
}

/// Raw, on-disk configuration shape (TOML via `serde`, mirroring the
/// teacher's `NodeConfig` pattern).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawConfig {
    /// Bind IP, loose or canonical form.
    pub bind_ip: String,
    /// Bind port.
    pub bind_port: u16,
    /// Whether this peer is the root.
    pub is_root: bool,
    /// Root IP; required when `is_root` is false.
    #[serde(default)]
    pub root_ip: Option<String>,
    /// Root port; required when `is_root` is false.
    #[serde(default)]
    pub root_port: Option<u16>,
    /// Reunion hello period, seconds. Default 4 (spec §5 T_hello).
    #[serde(default = "default_hello_interval_secs")]
    pub hello_interval_secs: u64,
    /// Reunion failure window, seconds. Default 32 (spec §5 T_fail).
    #[serde(default = "default_fail_window_secs")]
    pub fail_window_secs: u64,
    /// Root sweeper interval, seconds. Defaults to `fail_window_secs / 2`
    /// per spec §4.4 if unset (0 means "derive").
    #[serde(default)]
    pub sweep_interval_secs: u64,
    /// Main-loop tick period, milliseconds. Default 2000 (spec §4.6).
    #[serde(default = "default_tick_interval_millis")]
    pub tick_interval_millis: u64,
    /// Optional bind address for the Prometheus `/metrics` endpoint.
    #[serde(default)]
    pub metrics_listen_addr: Option<String>,
}

fn default_hello_interval_secs() -> u64 {
    4
}
fn default_fail_window_secs() -> u64 {
    32
}
fn default_tick_interval_millis() -> u64 {
    2000
}

/// Validated, canonicalized node configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// This peer's own canonical address.
    pub bind_addr: Address,
    /// Whether this peer is the root.
    pub is_root: bool,
    /// Root's canonical address (same as `bind_addr` when `is_root`).
    pub root_addr: Address,
    /// Reunion hello period.
    pub hello_interval_secs: u64,
    /// Reunion failure window.
    pub fail_window_secs: u64,
    /// Root sweeper interval.
    pub sweep_interval_secs: u64,
    /// Main-loop tick period, milliseconds.
    pub tick_interval_millis: u64,
    /// Optional metrics HTTP listen address, "ip:port" form.
    pub metrics_listen_addr: Option<String>,
}

impl NodeConfig {
    /// Validate and canonicalize a raw, deserialized configuration.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let bind_addr = Address::parse_with_port(&raw.bind_ip, raw.bind_port)
            .map_err(ConfigError::InvalidBindAddress)?;

        let root_addr = if raw.is_root {
            bind_addr.clone()
        } else {
            let ip = raw.root_ip.ok_or(ConfigError::MissingRootAddress)?;
            let port = raw.root_port.ok_or(ConfigError::MissingRootAddress)?;
            Address::parse_with_port(&ip, port).map_err(ConfigError::InvalidRootAddress)?
        };

        let fail_window_secs = raw.fail_window_secs;
        let sweep_interval_secs = if raw.sweep_interval_secs == 0 {
            (fail_window_secs / 2).max(1)
        } else {
            raw.sweep_interval_secs
        };

        Ok(Self {
            bind_addr,
            is_root: raw.is_root,
            root_addr,
            hello_interval_secs: raw.hello_interval_secs,
            fail_window_secs,
            sweep_interval_secs,
            tick_interval_millis: raw.tick_interval_millis,
            metrics_listen_addr: raw.metrics_listen_addr,
        })
    }

    /// Load and validate from a TOML file on disk.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawConfig = toml::from_str(&text)?;
        Ok(Self::from_raw(raw)?)
    }

    /// Build from environment variables, applying `TREECAST_*`
    /// overrides on top of supplied defaults, mirroring the teacher's
    /// `env()` helper in `main.rs`.
    pub fn from_env(defaults: RawConfig) -> anyhow::Result<Self> {
        fn env_override(key: &str, default: String) -> String {
            std::env::var(key).unwrap_or(default)
        }

        let bind_ip = env_override("TREECAST_BIND_IP", defaults.bind_ip);
        let bind_port: u16 = env_override("TREECAST_BIND_PORT", defaults.bind_port.to_string())
            .parse()
            .unwrap_or(defaults.bind_port);
        let is_root: bool = env_override("TREECAST_IS_ROOT", defaults.is_root.to_string())
            .parse()
            .unwrap_or(defaults.is_root);
        let root_ip = std::env::var("TREECAST_ROOT_IP").ok().or(defaults.root_ip);
        let root_port = std::env::var("TREECAST_ROOT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(defaults.root_port);

        let raw = RawConfig {
            bind_ip,
            bind_port,
            is_root,
            root_ip,
            root_port,
            ..defaults
        };
        Ok(Self::from_raw(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_raw() -> RawConfig {
        RawConfig {
            bind_ip: "127.0.0.1".to_string(),
            bind_port: 4000,
            is_root: true,
            root_ip: None,
            root_port: None,
            hello_interval_secs: 4,
            fail_window_secs: 32,
            sweep_interval_secs: 0,
            tick_interval_millis: 2000,
            metrics_listen_addr: None,
        }
    }

    #[test]
    fn root_config_uses_own_address_as_root() {
        let cfg = NodeConfig::from_raw(base_raw()).unwrap();
        assert_eq!(cfg.bind_addr, cfg.root_addr);
        assert_eq!(cfg.sweep_interval_secs, 16);
    }

    #[test]
    fn client_without_root_address_fails() {
        let mut raw = base_raw();
        raw.is_root = false;
        assert_eq!(
            NodeConfig::from_raw(raw).unwrap_err(),
            ConfigError::MissingRootAddress
        );
    }

    #[test]
    fn client_with_root_address_succeeds() {
        let mut raw = base_raw();
        raw.is_root = false;
        raw.root_ip = Some("10.0.0.1".to_string());
        raw.root_port = Some(9000);
        let cfg = NodeConfig::from_raw(raw).unwrap();
        assert_ne!(cfg.bind_addr, cfg.root_addr);
    }
}
