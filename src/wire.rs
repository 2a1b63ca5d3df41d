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

//! Wire codec: the 20-byte packet envelope and the five per-type body
//! formats (spec §4.1).
//!
//! All bodies are fixed-width ASCII except the Message body, which is an
//! arbitrary-length payload, and Reunion, which is a repeated fixed-width
//! group. `decode_frame`/`encode_frame` are a byte-exact round trip for
//! every valid input.

use crate::address::{Address, AddressError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Fixed envelope header size in bytes.
pub const HEADER_LEN: usize = 20;

/// Protocol version. The codec rejects any other value.
pub const PROTOCOL_VERSION: u16 = 1;

/// Packet type discriminants (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// Register REQ/RES.
    Register = 1,
    /// Advertise REQ/RES.
    Advertise = 2,
    /// Join (one-shot).
    Join = 3,
    /// Broadcast payload.
    Message = 4,
    /// Reunion REQ/RES.
    Reunion = 5,
}

impl PacketType {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::Register),
            2 => Some(Self::Advertise),
            3 => Some(Self::Join),
            4 => Some(Self::Message),
            5 => Some(Self::Reunion),
            _ => None,
        }
    }
}

/// Codec errors. Every variant maps to spec §7 `MalformedPacket`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer than `HEADER_LEN` bytes available.
    #[error("short header")]
    ShortHeader,
    /// `version` field is not `PROTOCOL_VERSION`.
    #[error("unsupported version")]
    UnsupportedVersion,
    /// `type` field is not in 1..5.
    #[error("unknown packet type")]
    UnknownType,
    /// Decoded `length` does not match the available body bytes.
    #[error("length mismatch")]
    LengthMismatch,
    /// Body does not match its type's fixed layout.
    #[error("malformed body")]
    MalformedBody,
    /// An embedded address failed to parse.
    #[error("malformed address")]
    MalformedAddress,
}

impl From<AddressError> for WireError {
    fn from(_: AddressError) -> Self {
        WireError::MalformedAddress
    }
}

/// A decoded packet: envelope fields plus the raw body bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Always `PROTOCOL_VERSION` for a packet that decoded successfully.
    pub version: u16,
    /// Packet type.
    pub ptype: PacketType,
    /// Source address, as carried in the envelope (8-byte ip + 4-byte port).
    pub src: Address,
    /// Raw body bytes; length always equals the encoded `length` field.
    pub body: Bytes,
}

/// Reunion REQ/RES operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReunionOp {
    /// Hello flowing leafward -> rootward.
    Req,
    /// Echo flowing rootward -> leafward.
    Res,
}

/// Encode the 20-byte envelope header. `body_len` must equal `body.len()`
/// of the frame this header precedes.
fn encode_header(out: &mut BytesMut, ptype: PacketType, body_len: usize, src: &Address) {
    out.put_u16(PROTOCOL_VERSION);
    out.put_u16(ptype as u16);
    out.put_u32(body_len as u32);
    for octet in src.octets() {
        out.put_u16(octet as u16);
    }
    out.put_u32(src.port() as u32);
}

/// Encode a Register REQ.
pub fn encode_register_req(src: &Address, requester: &Address) -> Bytes {
    let mut body = BytesMut::with_capacity(23);
    body.put_slice(b"REQ");
    body.put_slice(requester.ip().as_bytes());
    body.put_slice(requester.port_str().as_bytes());
    frame(PacketType::Register, src, &body)
}

/// Encode a Register RES (always the literal ACK body).
pub fn encode_register_res_ack(src: &Address) -> Bytes {
    let mut body = BytesMut::with_capacity(6);
    body.put_slice(b"RES");
    body.put_slice(b"ACK");
    frame(PacketType::Register, src, &body)
}

/// Encode an Advertise REQ.
pub fn encode_advertise_req(src: &Address) -> Bytes {
    let mut body = BytesMut::with_capacity(3);
    body.put_slice(b"REQ");
    frame(PacketType::Advertise, src, &body)
}

/// Encode an Advertise RES carrying the assigned parent's address.
pub fn encode_advertise_res(src: &Address, parent: &Address) -> Bytes {
    let mut body = BytesMut::with_capacity(23);
    body.put_slice(b"RES");
    body.put_slice(parent.ip().as_bytes());
    body.put_slice(parent.port_str().as_bytes());
    frame(PacketType::Advertise, src, &body)
}

/// Encode a Join notice.
pub fn encode_join(src: &Address) -> Bytes {
    let body = Bytes::from_static(b"JOIN");
    frame(PacketType::Join, src, &body)
}

/// Encode a Message (broadcast payload), any length.
pub fn encode_message(src: &Address, payload: &[u8]) -> Bytes {
    frame(PacketType::Message, src, &Bytes::copy_from_slice(payload))
}

/// Encode a Reunion REQ/RES carrying a path of addresses.
///
/// `op` selects "REQ" or "RES"; `path` is the ordered address list, whose
/// length is encoded as a 2-digit zero-padded decimal (so at most 99
/// hops — ample given the depth-8 bound).
pub fn encode_reunion(src: &Address, op: ReunionOp, path: &[Address]) -> Bytes {
    let mut body = BytesMut::with_capacity(5 + 20 * path.len());
    body.put_slice(match op {
        ReunionOp::Req => b"REQ",
        ReunionOp::Res => b"RES",
    });
    body.put_slice(format!("{:02}", path.len()).as_bytes());
    for a in path {
        body.put_slice(a.ip().as_bytes());
        body.put_slice(a.port_str().as_bytes());
    }
    frame(PacketType::Reunion, src, &body)
}

fn frame(ptype: PacketType, src: &Address, body: &Bytes) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
    encode_header(&mut out, ptype, body.len(), src);
    out.put_slice(body);
    out.freeze()
}

/// Decode a single frame. Rejects short headers, bad version, unknown
/// type, and any `length` that does not match the trailing body size.
pub fn decode_frame(mut bytes: Bytes) -> Result<Packet, WireError> {
    if bytes.len() < HEADER_LEN {
        return Err(WireError::ShortHeader);
    }
    let version = bytes.get_u16();
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion);
    }
    let raw_type = bytes.get_u16();
    let ptype = PacketType::from_u16(raw_type).ok_or(WireError::UnknownType)?;
    let length = bytes.get_u32() as usize;

    let mut ip_octets = [0u8; 4];
    for slot in ip_octets.iter_mut() {
        *slot = bytes.get_u16() as u8;
    }
    let port = bytes.get_u32() as u16;
    let src = Address::from_parts(ip_octets, port);

    if bytes.len() != length {
        return Err(WireError::LengthMismatch);
    }

    Ok(Packet {
        version,
        ptype,
        src,
        body: bytes,
    })
}

/// Parsed Register body.
pub enum RegisterBody {
    /// REQ carrying the registering peer's own address.
    Req(Address),
    /// RES; the spec only defines the "ACK" form.
    ResAck,
}

/// Parse a Register body.
pub fn parse_register_body(body: &[u8]) -> Result<RegisterBody, WireError> {
    if body.len() >= 3 && &body[0..3] == b"REQ" {
        if body.len() != 23 {
            return Err(WireError::MalformedBody);
        }
        let ip = std::str::from_utf8(&body[3..18]).map_err(|_| WireError::MalformedBody)?;
        let port = std::str::from_utf8(&body[18..23]).map_err(|_| WireError::MalformedBody)?;
        let addr = Address::parse(ip, port)?;
        Ok(RegisterBody::Req(addr))
    } else if body == b"RESACK" {
        Ok(RegisterBody::ResAck)
    } else {
        Err(WireError::MalformedBody)
    }
}

/// Parsed Advertise body.
pub enum AdvertiseBody {
    /// REQ, no payload.
    Req,
    /// RES carrying the assigned parent's address.
    Res(Address),
}

/// Parse an Advertise body.
pub fn parse_advertise_body(body: &[u8]) -> Result<AdvertiseBody, WireError> {
    if body == b"REQ" {
        Ok(AdvertiseBody::Req)
    } else if body.len() == 23 && &body[0..3] == b"RES" {
        let ip = std::str::from_utf8(&body[3..18]).map_err(|_| WireError::MalformedBody)?;
        let port = std::str::from_utf8(&body[18..23]).map_err(|_| WireError::MalformedBody)?;
        let addr = Address::parse(ip, port)?;
        Ok(AdvertiseBody::Res(addr))
    } else {
        Err(WireError::MalformedBody)
    }
}

/// Validate a Join body (the only valid body is the literal "JOIN").
pub fn parse_join_body(body: &[u8]) -> Result<(), WireError> {
    if body == b"JOIN" {
        Ok(())
    } else {
        Err(WireError::MalformedBody)
    }
}

/// Parse a Reunion body into its operation and path.
pub fn parse_reunion_body(body: &[u8]) -> Result<(ReunionOp, Vec<Address>), WireError> {
    if body.len() < 5 {
        return Err(WireError::MalformedBody);
    }
    let op = match &body[0..3] {
        b"REQ" => ReunionOp::Req,
        b"RES" => ReunionOp::Res,
        _ => return Err(WireError::MalformedBody),
    };
    let n_str = std::str::from_utf8(&body[3..5]).map_err(|_| WireError::MalformedBody)?;
    let n: usize = n_str.parse().map_err(|_| WireError::MalformedBody)?;
    if body.len() != 5 + 20 * n {
        return Err(WireError::MalformedBody);
    }
    let mut path = Vec::with_capacity(n);
    let mut off = 5;
    for _ in 0..n {
        let ip = std::str::from_utf8(&body[off..off + 15]).map_err(|_| WireError::MalformedBody)?;
        let port =
            std::str::from_utf8(&body[off + 15..off + 20]).map_err(|_| WireError::MalformedBody)?;
        path.push(Address::parse(ip, port)?);
        off += 20;
    }
    Ok((op, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_smoke_test() {
        let src = Address::parse("192.168.1.1", "65000").unwrap();
        let frame = encode_message(&src, b"Hello World!");
        let expected: &[u8] = &[
            0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0C, 0x00, 0xC0, 0x00, 0xA8, 0x00, 0x01,
            0x00, 0x01, 0x00, 0x00, 0xFD, 0xE8,
        ];
        assert_eq!(&frame[..HEADER_LEN], expected);
        assert_eq!(&frame[HEADER_LEN..], b"Hello World!");
    }

    #[test]
    fn round_trip_register_req() {
        let src = Address::parse("127.0.0.1", "3652").unwrap();
        let requester = Address::parse("127.0.0.1", "35315").unwrap();
        let bytes = encode_register_req(&src, &requester);
        let pkt = decode_frame(bytes.clone()).unwrap();
        assert_eq!(pkt.version, PROTOCOL_VERSION);
        assert_eq!(pkt.ptype, PacketType::Register);
        assert_eq!(pkt.src, src);
        assert_eq!(pkt.body.len(), 23);
        match parse_register_body(&pkt.body).unwrap() {
            RegisterBody::Req(a) => assert_eq!(a, requester),
            RegisterBody::ResAck => panic!("wrong variant"),
        }
    }

    #[test]
    fn round_trip_register_res_ack() {
        let src = Address::parse("127.0.0.1", "3652").unwrap();
        let bytes = encode_register_res_ack(&src);
        let pkt = decode_frame(bytes).unwrap();
        assert!(matches!(
            parse_register_body(&pkt.body).unwrap(),
            RegisterBody::ResAck
        ));
    }

    #[test]
    fn round_trip_reunion_path() {
        let src = Address::parse("1.1.1.1", "1").unwrap();
        let a = Address::parse("2.2.2.2", "2").unwrap();
        let b = Address::parse("3.3.3.3", "3").unwrap();
        let bytes = encode_reunion(&src, ReunionOp::Req, &[a.clone(), b.clone()]);
        let pkt = decode_frame(bytes).unwrap();
        let (op, path) = parse_reunion_body(&pkt.body).unwrap();
        assert_eq!(op, ReunionOp::Req);
        assert_eq!(path, vec![a, b]);
    }

    #[test]
    fn rejects_length_mismatch() {
        let src = Address::parse("1.1.1.1", "1").unwrap();
        let mut bytes = BytesMut::from(&encode_join(&src)[..]);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(
            decode_frame(bytes.freeze()),
            Err(WireError::LengthMismatch)
        );
    }

    #[test]
    fn rejects_short_header() {
        let short = Bytes::from_static(&[0u8; 10]);
        assert_eq!(decode_frame(short), Err(WireError::ShortHeader));
    }

    #[test]
    fn rejects_unknown_type() {
        let src = Address::parse("1.1.1.1", "1").unwrap();
        let mut bytes = BytesMut::from(&encode_join(&src)[..]);
        bytes[3] = 9;
        assert_eq!(decode_frame(bytes.freeze()), Err(WireError::UnknownType));
    }

    #[test]
    fn rejects_bad_version() {
        let src = Address::parse("1.1.1.1", "1").unwrap();
        let mut bytes = BytesMut::from(&encode_join(&src)[..]);
        bytes[1] = 2;
        assert_eq!(
            decode_frame(bytes.freeze()),
            Err(WireError::UnsupportedVersion)
        );
    }
}
