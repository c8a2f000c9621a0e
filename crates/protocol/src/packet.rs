//! Packet framing.
//!
//! # Wire format
//!
//! ```text
//! REQUEST:  [1 byte: opcode]        [2 bytes BE: packet length][non-header data][headers]
//! RESPONSE: [1 byte: response code] [2 bytes BE: packet length][non-header data][headers]
//!
//! CONNECT non-header data:  [1 byte: version][1 byte: flags][2 bytes BE: max packet length]
//! SETPATH non-header data:  [1 byte: flags][1 byte: constants]
//! ```
//!
//! The packet length counts every byte, including the 3-byte prefix.

use std::io::{ErrorKind, Read};

use bitflags::bitflags;

use crate::header::HeaderSet;
use crate::opcode::Command;
use crate::response::ResponseCode;
use crate::{OBEX_VERSION, ProtocolError};

bitflags! {
    /// Flags carried in the SETPATH non-header data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetPathFlags: u8 {
        /// Go to the parent folder before applying the name.
        const LEVEL_UP = 0x01;
        /// Do not create the named folder if it is missing.
        const NO_CREATE = 0x02;
    }
}

impl SetPathFlags {
    pub fn from_nonheader(data: &[u8]) -> Result<Self, ProtocolError> {
        match data.first() {
            Some(&flags) => Ok(Self::from_bits_truncate(flags)),
            None => Err(ProtocolError::Truncated {
                needed: 2,
                available: data.len(),
            }),
        }
    }
}

/// CONNECT non-header data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo {
    pub version: u8,
    pub flags: u8,
    pub max_packet: u16,
}

impl ConnectInfo {
    pub fn new(max_packet: u16) -> Self {
        Self {
            version: OBEX_VERSION,
            flags: 0,
            max_packet,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::Truncated {
                needed: 4,
                available: data.len(),
            });
        }
        Ok(Self {
            version: data[0],
            flags: data[1],
            max_packet: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let [hi, lo] = self.max_packet.to_be_bytes();
        vec![self.version, self.flags, hi, lo]
    }
}

/// One request packet as received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub command: Command,
    pub is_final: bool,
    pub nonheader: Vec<u8>,
    pub headers: HeaderSet,
}

impl RequestPacket {
    pub fn new(command: Command, is_final: bool) -> Self {
        Self {
            command,
            is_final,
            nonheader: Vec::new(),
            headers: HeaderSet::new(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let total = check_frame(buf)?;
        let (command, is_final) = Command::from_opcode(buf[0]);
        let body_start = 3 + command.nonheader_len();
        if total < body_start {
            return Err(ProtocolError::Truncated {
                needed: body_start,
                available: total,
            });
        }
        Ok(Self {
            command,
            is_final,
            nonheader: buf[3..body_start].to_vec(),
            headers: HeaderSet::decode(&buf[body_start..total])?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        frame(
            self.command.opcode(self.is_final),
            &self.nonheader,
            &self.headers,
        )
    }
}

/// One response packet sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub code: ResponseCode,
    pub nonheader: Vec<u8>,
    pub headers: HeaderSet,
}

impl ResponsePacket {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            nonheader: Vec::new(),
            headers: HeaderSet::new(),
        }
    }

    /// Decodes a response; `nonheader_len` depends on the request it answers.
    pub fn decode(buf: &[u8], nonheader_len: usize) -> Result<Self, ProtocolError> {
        let total = check_frame(buf)?;
        let code = ResponseCode::from_byte(buf[0]).ok_or(ProtocolError::UnknownResponse(buf[0]))?;
        let body_start = 3 + nonheader_len;
        if total < body_start {
            return Err(ProtocolError::Truncated {
                needed: body_start,
                available: total,
            });
        }
        Ok(Self {
            code,
            nonheader: buf[3..body_start].to_vec(),
            headers: HeaderSet::decode(&buf[body_start..total])?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        frame(self.code.to_byte(), &self.nonheader, &self.headers)
    }
}

fn check_frame(buf: &[u8]) -> Result<usize, ProtocolError> {
    if buf.len() < 3 {
        return Err(ProtocolError::Truncated {
            needed: 3,
            available: buf.len(),
        });
    }
    let total = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    if total < 3 || total != buf.len() {
        return Err(ProtocolError::InvalidLength(total));
    }
    Ok(total)
}

fn frame(first: u8, nonheader: &[u8], headers: &HeaderSet) -> Result<Vec<u8>, ProtocolError> {
    let total = 3 + nonheader.len() + headers.encoded_len();
    if total > u16::MAX as usize {
        return Err(ProtocolError::PacketTooLarge(total));
    }
    let mut out = Vec::with_capacity(total);
    out.push(first);
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.extend_from_slice(nonheader);
    headers.encode(&mut out)?;
    Ok(out)
}

/// Reads one complete packet.
///
/// Returns `None` on a clean end of stream before the first byte.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut first = [0u8; 1];
    loop {
        match reader.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    let total = u16::from_be_bytes(len) as usize;
    if total < 3 {
        return Err(ProtocolError::InvalidLength(total));
    }

    let mut packet = Vec::with_capacity(total);
    packet.push(first[0]);
    packet.extend_from_slice(&len);
    packet.resize(total, 0);
    reader.read_exact(&mut packet[3..])?;
    Ok(Some(packet))
}
