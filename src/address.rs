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

//! Canonical peer addresses: dotted-quad IP + decimal port, zero-padded.
//!
//! Canonicalization is mandatory before any equality comparison (spec §3);
//! every other module stores and compares `Address`, never raw strings.

use std::fmt;
use thiserror::Error;

/// Address parsing/canonicalization errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// IP does not have exactly four octets.
    #[error("malformed ip")]
    MalformedIp,
    /// An IP octet is not a valid u8.
    #[error("invalid ip octet")]
    InvalidOctet,
    /// Port does not parse as u16.
    #[error("invalid port")]
    InvalidPort,
}

/// Canonical (ip, port) pair.
///
/// `ip` is always "DDD.DDD.DDD.DDD" (three-digit zero-padded octets);
/// `port` is always a five-digit zero-padded decimal string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    ip: String,
    port: String,
}

impl Address {
    /// Build a canonical address from numeric parts.
    pub fn from_parts(octets: [u8; 4], port: u16) -> Self {
        Self {
            ip: format!(
                "{:03}.{:03}.{:03}.{:03}",
                octets[0], octets[1], octets[2], octets[3]
            ),
            port: format!("{:05}", port),
        }
    }

    /// Parse and canonicalize from loose textual forms, e.g. "192.168.1.1"
    /// with port 5335, or an already-canonical "192.168.001.001" string.
    pub fn parse(ip: &str, port: &str) -> Result<Self, AddressError> {
        let octets = parse_octets(ip)?;
        let port_num: u16 = port.trim().parse().map_err(|_| AddressError::InvalidPort)?;
        Ok(Self::from_parts(octets, port_num))
    }

    /// Parse from a numeric port directly (skips the string->u16 step).
    pub fn parse_with_port(ip: &str, port: u16) -> Result<Self, AddressError> {
        let octets = parse_octets(ip)?;
        Ok(Self::from_parts(octets, port))
    }

    /// The canonical 15-byte IP string, e.g. "192.168.001.001".
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// The canonical 5-byte port string, e.g. "05335".
    pub fn port_str(&self) -> &str {
        &self.port
    }

    /// The port as a number.
    pub fn port(&self) -> u16 {
        self.port.parse().unwrap_or(0)
    }

    /// Octets of the IP, in order.
    pub fn octets(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        for (i, part) in self.ip.split('.').enumerate().take(4) {
            out[i] = part.parse().unwrap_or(0);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

fn parse_octets(ip: &str) -> Result<[u8; 4], AddressError> {
    let parts: Vec<&str> = ip.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(AddressError::MalformedIp);
    }
    let mut out = [0u8; 4];
    for (i, p) in parts.iter().enumerate() {
        out[i] = p.trim().parse().map_err(|_| AddressError::InvalidOctet)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_loose_input() {
        let a = Address::parse("192.168.1.1", "5335").unwrap();
        assert_eq!(a.ip(), "192.168.001.001");
        assert_eq!(a.port_str(), "05335");
    }

    #[test]
    fn idempotent_on_canonical_input() {
        let a = Address::parse("192.168.001.001", "05335").unwrap();
        let b = Address::parse(a.ip(), a.port_str()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_malformed_ip() {
        assert_eq!(
            Address::parse("192.168.1", "1000"),
            Err(AddressError::MalformedIp)
        );
        assert_eq!(
            Address::parse("192.168.1.999", "1000"),
            Err(AddressError::InvalidOctet)
        );
    }

    #[test]
    fn rejects_bad_port() {
        assert_eq!(
            Address::parse("1.2.3.4", "not-a-port"),
            Err(AddressError::InvalidPort)
        );
    }

    #[test]
    fn equality_is_canonical() {
        let a = Address::parse("10.0.0.1", "80").unwrap();
        let b = Address::parse("010.000.000.001", "00080").unwrap();
        assert_eq!(a, b);
    }
}
