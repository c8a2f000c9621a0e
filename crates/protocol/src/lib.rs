//! OBEX wire types for the obexbox server.
//!
//! Covers the parts of the OBEX framing the transaction engine consumes:
//! command opcodes, response codes, the header model with its four length
//! encodings, packet framing, and the time formats carried in headers.
//!
//! Every decoder here bounds-checks lengths against the buffer it was given
//! and returns a [`ProtocolError`] instead of trusting wire lengths.

pub mod header;
pub mod opcode;
pub mod packet;
pub mod response;
pub mod time;

pub use header::{Header, HeaderSet};
pub use opcode::Command;
pub use packet::{ConnectInfo, RequestPacket, ResponsePacket, SetPathFlags, read_packet};
pub use response::ResponseCode;

use uuid::Uuid;

/// OBEX protocol version advertised in CONNECT (1.0).
pub const OBEX_VERSION: u8 = 0x10;

/// Smallest maximum packet length a peer may negotiate.
pub const MIN_PACKET_LEN: u16 = 255;

/// Largest packet length representable in the 2-byte length field.
pub const MAX_PACKET_LEN: u16 = u16::MAX;

/// Target UUID of the OBEX File Transfer profile.
pub const FTP_TARGET: Uuid = Uuid::from_u128(0xF9EC7BC4_953C_11D2_984E_525400DC9E09);

/// Errors produced while decoding or encoding OBEX data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated data: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid length field: {0}")]
    InvalidLength(usize),

    #[error("invalid text in header 0x{0:02x}")]
    InvalidText(u8),

    #[error("unknown response code 0x{0:02x}")]
    UnknownResponse(u8),

    #[error("packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("invalid time value: {0}")]
    InvalidTime(String),
}
