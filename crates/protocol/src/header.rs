//! OBEX headers.
//!
//! # Wire format
//!
//! ```text
//! [1 byte: header id]   the two high bits select the encoding:
//!   00  [2 bytes BE: total length][UTF-16BE text, NUL terminated]
//!   01  [2 bytes BE: total length][raw bytes]
//!   10  [1 byte value]
//!   11  [4 bytes BE value]
//! ```
//!
//! The total length of the variable encodings includes the 3-byte prefix.
//! A Name header of total length 3 is an empty name, which SETPATH treats
//! differently from an absent Name header.

use chrono::{DateTime, Utc};

use crate::ProtocolError;

/// Header identifiers understood by the server.
pub mod id {
    pub const NAME: u8 = 0x01;
    pub const TYPE: u8 = 0x42;
    pub const LENGTH: u8 = 0xC3;
    pub const TIME_ISO: u8 = 0x44;
    pub const TIME_POSIX: u8 = 0xC4;
    pub const TARGET: u8 = 0x46;
    pub const HTTP: u8 = 0x47;
    pub const BODY: u8 = 0x48;
    pub const END_OF_BODY: u8 = 0x49;
    pub const WHO: u8 = 0x4A;
    pub const AUTH_CHALLENGE: u8 = 0x4D;
    pub const AUTH_RESPONSE: u8 = 0x4E;
    pub const CONNECTION_ID: u8 = 0xCB;
}

/// Length encoding selected by the high bits of a header id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Unicode,
    Bytes,
    Byte,
    Quad,
}

impl Encoding {
    pub fn of(id: u8) -> Self {
        match id >> 6 {
            0 => Self::Unicode,
            1 => Self::Bytes,
            2 => Self::Byte,
            _ => Self::Quad,
        }
    }
}

/// A decoded OBEX header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Name(String),
    Type(String),
    Length(u32),
    TimeIso(String),
    TimePosix(u32),
    Target(Vec<u8>),
    Http(Vec<u8>),
    Body(Vec<u8>),
    EndOfBody(Vec<u8>),
    Who(Vec<u8>),
    AuthChallenge(Vec<u8>),
    AuthResponse(Vec<u8>),
    ConnectionId(u32),
    /// A header the server does not interpret, kept as its raw payload.
    Other { id: u8, data: Vec<u8> },
}

impl Header {
    pub fn id(&self) -> u8 {
        match self {
            Self::Name(_) => id::NAME,
            Self::Type(_) => id::TYPE,
            Self::Length(_) => id::LENGTH,
            Self::TimeIso(_) => id::TIME_ISO,
            Self::TimePosix(_) => id::TIME_POSIX,
            Self::Target(_) => id::TARGET,
            Self::Http(_) => id::HTTP,
            Self::Body(_) => id::BODY,
            Self::EndOfBody(_) => id::END_OF_BODY,
            Self::Who(_) => id::WHO,
            Self::AuthChallenge(_) => id::AUTH_CHALLENGE,
            Self::AuthResponse(_) => id::AUTH_RESPONSE,
            Self::ConnectionId(_) => id::CONNECTION_ID,
            Self::Other { id, .. } => *id,
        }
    }

    /// Returns `true` for Body and EndOfBody.
    pub fn is_body(&self) -> bool {
        matches!(self, Self::Body(_) | Self::EndOfBody(_))
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Name(name) => {
                if name.is_empty() {
                    return Vec::new();
                }
                let mut out: Vec<u8> = name.encode_utf16().flat_map(u16::to_be_bytes).collect();
                out.extend_from_slice(&[0, 0]);
                out
            }
            Self::Type(mime) => {
                let mut out = mime.as_bytes().to_vec();
                out.push(0);
                out
            }
            Self::TimeIso(text) => text.as_bytes().to_vec(),
            Self::Length(v) | Self::TimePosix(v) | Self::ConnectionId(v) => v.to_be_bytes().to_vec(),
            Self::Target(data)
            | Self::Http(data)
            | Self::Body(data)
            | Self::EndOfBody(data)
            | Self::Who(data)
            | Self::AuthChallenge(data)
            | Self::AuthResponse(data) => data.clone(),
            Self::Other { data, .. } => data.clone(),
        }
    }

    /// Number of bytes [`encode`](Self::encode) will produce.
    pub fn encoded_len(&self) -> usize {
        match Encoding::of(self.id()) {
            Encoding::Unicode | Encoding::Bytes => 3 + self.payload().len(),
            Encoding::Byte => 2,
            Encoding::Quad => 5,
        }
    }

    /// Appends the wire form of this header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let id = self.id();
        let payload = self.payload();
        match Encoding::of(id) {
            Encoding::Unicode | Encoding::Bytes => {
                let total = payload.len() + 3;
                if total > u16::MAX as usize {
                    return Err(ProtocolError::InvalidLength(total));
                }
                out.push(id);
                out.extend_from_slice(&(total as u16).to_be_bytes());
                out.extend_from_slice(&payload);
            }
            Encoding::Byte => {
                if payload.len() != 1 {
                    return Err(ProtocolError::InvalidLength(payload.len()));
                }
                out.push(id);
                out.push(payload[0]);
            }
            Encoding::Quad => {
                if payload.len() != 4 {
                    return Err(ProtocolError::InvalidLength(payload.len()));
                }
                out.push(id);
                out.extend_from_slice(&payload);
            }
        }
        Ok(())
    }

    /// Decodes one header from the start of `buf`.
    ///
    /// Returns the header and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        need(buf, 1)?;
        let id = buf[0];
        let (data, used) = match Encoding::of(id) {
            Encoding::Unicode | Encoding::Bytes => {
                need(buf, 3)?;
                let total = u16::from_be_bytes([buf[1], buf[2]]) as usize;
                if total < 3 {
                    return Err(ProtocolError::InvalidLength(total));
                }
                need(buf, total)?;
                (&buf[3..total], total)
            }
            Encoding::Byte => {
                need(buf, 2)?;
                (&buf[1..2], 2)
            }
            Encoding::Quad => {
                need(buf, 5)?;
                (&buf[1..5], 5)
            }
        };

        let header = match id {
            id::NAME => Self::Name(decode_utf16(id, data)?),
            id::TYPE => Self::Type(decode_ascii(id, data)?),
            id::LENGTH => Self::Length(be_u32(data)),
            id::TIME_ISO => Self::TimeIso(decode_ascii(id, data)?),
            id::TIME_POSIX => Self::TimePosix(be_u32(data)),
            id::TARGET => Self::Target(data.to_vec()),
            id::HTTP => Self::Http(data.to_vec()),
            id::BODY => Self::Body(data.to_vec()),
            id::END_OF_BODY => Self::EndOfBody(data.to_vec()),
            id::WHO => Self::Who(data.to_vec()),
            id::AUTH_CHALLENGE => Self::AuthChallenge(data.to_vec()),
            id::AUTH_RESPONSE => Self::AuthResponse(data.to_vec()),
            id::CONNECTION_ID => Self::ConnectionId(be_u32(data)),
            _ => Self::Other {
                id,
                data: data.to_vec(),
            },
        };
        Ok((header, used))
    }
}

fn need(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

// Callers only pass the 4-byte slice of a quad header.
fn be_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn decode_utf16(id: u8, data: &[u8]) -> Result<String, ProtocolError> {
    if data.len() % 2 != 0 {
        return Err(ProtocolError::InvalidText(id));
    }
    let mut units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidText(id))
}

fn decode_ascii(id: u8, data: &[u8]) -> Result<String, ProtocolError> {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = &data[..end];
    if !text.is_ascii() {
        return Err(ProtocolError::InvalidText(id));
    }
    String::from_utf8(text.to_vec()).map_err(|_| ProtocolError::InvalidText(id))
}

/// An ordered list of headers from one packet or one whole request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: Vec<Header>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Decodes headers until `buf` is exhausted.
    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut set = Self::new();
        while !buf.is_empty() {
            let (header, used) = Header::decode(buf)?;
            set.push(header);
            buf = &buf[used..];
        }
        Ok(set)
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        for header in &self.headers {
            header.encode(out)?;
        }
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        self.headers.iter().map(Header::encoded_len).sum()
    }

    /// First Name header; `Some("")` for an empty name.
    pub fn name(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::Name(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::Type(mime) => Some(mime.as_str()),
            _ => None,
        })
    }

    pub fn length(&self) -> Option<u32> {
        self.headers.iter().find_map(|h| match h {
            Header::Length(len) => Some(*len),
            _ => None,
        })
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::Target(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.headers.iter().find_map(|h| match h {
            Header::ConnectionId(cid) => Some(*cid),
            _ => None,
        })
    }

    pub fn auth_response(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::AuthResponse(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// All HTTP header payloads, in order.
    pub fn http(&self) -> impl Iterator<Item = &[u8]> {
        self.headers.iter().filter_map(|h| match h {
            Header::Http(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Modification time from either the ISO-8601 or the POSIX header.
    pub fn time(&self) -> Result<Option<DateTime<Utc>>, ProtocolError> {
        for header in &self.headers {
            match header {
                Header::TimeIso(text) => return crate::time::parse_iso8601(text).map(Some),
                Header::TimePosix(secs) => return Ok(Some(crate::time::from_posix(*secs))),
                _ => {}
            }
        }
        Ok(None)
    }

    pub fn has_body(&self) -> bool {
        self.headers.iter().any(Header::is_body)
    }

    /// Copy of this set without Body/EndOfBody headers.
    pub fn without_body(&self) -> Self {
        self.headers
            .iter()
            .filter(|h| !h.is_body())
            .cloned()
            .collect()
    }
}

impl FromIterator<Header> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            headers: iter.into_iter().collect(),
        }
    }
}

impl Extend<Header> for HeaderSet {
    fn extend<I: IntoIterator<Item = Header>>(&mut self, iter: I) {
        self.headers.extend(iter);
    }
}

impl IntoIterator for HeaderSet {
    type Item = Header;
    type IntoIter = std::vec::IntoIter<Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.into_iter()
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}
