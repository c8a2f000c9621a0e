//! Request opcodes.

/// Bit set on the opcode of the last packet of a request.
pub const FINAL_BIT: u8 = 0x80;

/// An OBEX request command, without its final bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Disconnect,
    Put,
    Get,
    SetPath,
    Abort,
    /// Any opcode the server does not implement (SESSION, ACTION, ...).
    Other(u8),
}

impl Command {
    /// Splits a raw opcode byte into its command and final bit.
    pub fn from_opcode(opcode: u8) -> (Self, bool) {
        let is_final = opcode & FINAL_BIT != 0;
        let command = match opcode {
            0xFF => Self::Abort,
            _ => match opcode & !FINAL_BIT {
                0x00 => Self::Connect,
                0x01 => Self::Disconnect,
                0x02 => Self::Put,
                0x03 => Self::Get,
                0x05 => Self::SetPath,
                other => Self::Other(other),
            },
        };
        (command, is_final)
    }

    /// Returns the opcode without the final bit (ABORT is always `0xFF`).
    pub fn code(self) -> u8 {
        match self {
            Self::Connect => 0x00,
            Self::Disconnect => 0x01,
            Self::Put => 0x02,
            Self::Get => 0x03,
            Self::SetPath => 0x05,
            Self::Abort => 0xFF,
            Self::Other(code) => code,
        }
    }

    /// Returns the wire opcode with the final bit applied.
    pub fn opcode(self, is_final: bool) -> u8 {
        if is_final {
            self.code() | FINAL_BIT
        } else {
            self.code()
        }
    }

    /// Returns the length of the fixed non-header data following the
    /// packet length field.
    pub fn nonheader_len(self) -> usize {
        match self {
            Self::Connect => 4,
            Self::SetPath => 2,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("CONNECT"),
            Self::Disconnect => f.write_str("DISCONNECT"),
            Self::Put => f.write_str("PUT"),
            Self::Get => f.write_str("GET"),
            Self::SetPath => f.write_str("SETPATH"),
            Self::Abort => f.write_str("ABORT"),
            Self::Other(code) => write!(f, "0x{code:02x}"),
        }
    }
}
