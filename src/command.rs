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

//! The interactive command-line collaborator referenced by spec §6: a
//! producer of text lines, read here from stdin and turned into
//! `Command` values on a channel the dispatcher drains each tick.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Parsed command-surface values (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Trigger a Register REQ to root.
    Register,
    /// Trigger an Advertise REQ to root.
    Advertise,
    /// Broadcast `payload` to parent and all children.
    SendMessage(String),
}

/// Parse a stream of lines into commands. `SendMessage` consumes the
/// line immediately following it as the payload; unknown commands are
/// dropped silently (spec §6).
#[cfg(test)]
fn parse_lines(lines: &[String]) -> Vec<Command> {
    let mut out = Vec::new();
    let mut iter = lines.iter();
    while let Some(line) = iter.next() {
        match line.trim() {
            "Register" => out.push(Command::Register),
            "Advertise" => out.push(Command::Advertise),
            "SendMessage" => {
                if let Some(payload) = iter.next() {
                    out.push(Command::SendMessage(payload.clone()));
                }
            }
            other => {
                if !other.is_empty() {
                    debug!(line = %other, "unknown command dropped");
                }
            }
        }
    }
    out
}

/// Read lines from `reader` until EOF, forwarding parsed commands onto
/// `tx`. Intended to run as its own task, reading `tokio::io::stdin()`.
pub async fn run_command_reader<R>(reader: R, tx: mpsc::Sender<Command>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut pending: Option<String> = None;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(_) => break,
        };
        match pending.take() {
            Some(cmd) if cmd == "SendMessage" => {
                if tx.send(Command::SendMessage(line)).await.is_err() {
                    return;
                }
            }
            _ => match line.trim() {
                "Register" => {
                    if tx.send(Command::Register).await.is_err() {
                        return;
                    }
                }
                "Advertise" => {
                    if tx.send(Command::Advertise).await.is_err() {
                        return;
                    }
                }
                "SendMessage" => pending = Some("SendMessage".to_string()),
                other => {
                    if !other.trim().is_empty() {
                        debug!(line = %other, "unknown command dropped");
                    }
                }
            },
        }
    }
}
