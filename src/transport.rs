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

//! The raw-TCP collaborator referenced but left unspecified by spec §1/§6:
//! one accepting listener per peer plus outbound dials, each send/receive
//! carrying exactly one atomic byte frame. This module is deliberately
//! thin — it never parses a `Packet`, only moves bytes — so the wire
//! codec (`crate::wire`) remains the sole owner of framing semantics.

use crate::address::Address;
use crate::link::FrameSender;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream as StdTcpStream;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Maximum single-read buffer. Frames larger than this are only supported
/// if delivered across multiple reads is acceptable to the caller; for
/// this overlay's message sizes a generous single buffer suffices.
const READ_BUF_LEN: usize = 64 * 1024;

/// Literal transport-level acknowledgement written back on the accepting
/// socket for every frame received. This is not a protocol message (spec
/// §6): it only confirms delivery to whatever sent the bytes.
const TRANSPORT_ACK: &[u8] = b"ACK";

/// One inbound byte frame, tagged with the address it was read from (the
/// remote TCP peer address, not necessarily the packet's claimed `src`).
#[derive(Debug)]
pub struct InboundFrame {
    /// Remote socket address the bytes arrived from.
    pub from: Address,
    /// Raw frame bytes, handed to `crate::wire::decode_frame` unchanged.
    pub bytes: Bytes,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listening socket.
    #[error("bind failed")]
    Bind,
}

/// Accept loop: binds `bind_ip:bind_port` and forwards every inbound byte
/// read to `tx`. Runs until the listener errors.
pub async fn run_acceptor(
    bind_ip: &str,
    bind_port: u16,
    tx: mpsc::Sender<InboundFrame>,
) -> Result<(), TransportError> {
    let listener = TcpListener::bind((bind_ip, bind_port))
        .await
        .map_err(|_| TransportError::Bind)?;
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "accept failed");
                continue;
            }
        };
        let tx = tx.clone();
        let from = match Address::parse_with_port(&peer.ip().to_string(), peer.port()) {
            Ok(a) => a,
            Err(_) => {
                warn!(%peer, "could not canonicalize peer address, dropping connection");
                continue;
            }
        };
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUF_LEN];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) => {
                        debug!(%from, "connection closed");
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!(%from, err = %e, "read error");
                        return;
                    }
                };
                let bytes = Bytes::copy_from_slice(&buf[..n]);
                if tx
                    .send(InboundFrame {
                        from: from.clone(),
                        bytes,
                    })
                    .await
                    .is_err()
                {
                    return; // dispatcher gone, shut down
                }
                if let Err(e) = stream.write_all(TRANSPORT_ACK).await {
                    debug!(%from, err = %e, "failed to write transport ack");
                    return;
                }
            }
        });
    }
}

/// Outbound connection cache used by the link-table flush path. Connect
/// attempts are made lazily, on first send to an address, and a failed
/// write (or failed connect) drops the cached connection so the next
/// flush tries again — the link table itself removes the peer link on
/// failure (spec §4.2), this only owns the raw socket.
#[derive(Default)]
pub struct TcpFrameSender {
    conns: HashMap<Address, StdTcpStream>,
}

impl TcpFrameSender {
    /// Construct an empty sender.
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&mut self, addr: &Address) -> Result<&mut StdTcpStream, ()> {
        if !self.conns.contains_key(addr) {
            let octets = addr.octets();
            let ip = std::net::Ipv4Addr::from(octets);
            let stream = StdTcpStream::connect((ip, addr.port())).map_err(|_| ())?;
            stream.set_nodelay(true).ok();
            self.conns.insert(addr.clone(), stream);
        }
        self.conns.get_mut(addr).ok_or(())
    }
}

impl FrameSender for TcpFrameSender {
    fn send(&mut self, addr: &Address, frames: &[Bytes]) -> Result<(), ()> {
        let result = (|| -> std::io::Result<()> {
            let stream = self.connection(addr).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "connect failed")
            })?;
            for frame in frames {
                stream.write_all(frame)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => Ok(()),
            Err(_) => {
                self.conns.remove(addr);
                Err(())
            }
        }
    }
}
