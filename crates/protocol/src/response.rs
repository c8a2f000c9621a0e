//! Response codes.

/// OBEX response code (final bit implied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Continue,
    Success,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl ResponseCode {
    /// Wire byte including the final bit.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Continue => 0x90,
            Self::Success => 0xA0,
            Self::BadRequest => 0xC0,
            Self::Unauthorized => 0xC1,
            Self::Forbidden => 0xC3,
            Self::NotFound => 0xC4,
            Self::InternalServerError => 0xD0,
            Self::NotImplemented => 0xD1,
            Self::ServiceUnavailable => 0xD3,
        }
    }

    /// Parses a wire byte; the final bit is ignored.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte | 0x80 {
            0x90 => Self::Continue,
            0xA0 => Self::Success,
            0xC0 => Self::BadRequest,
            0xC1 => Self::Unauthorized,
            0xC3 => Self::Forbidden,
            0xC4 => Self::NotFound,
            0xD0 => Self::InternalServerError,
            0xD1 => Self::NotImplemented,
            0xD3 => Self::ServiceUnavailable,
            _ => return None,
        })
    }

    /// Continue and Success both mean "so far so good".
    pub fn is_success(self) -> bool {
        matches!(self, Self::Continue | Self::Success)
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Continue => "Continue",
            Self::Success => "Success",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ServiceUnavailable => "Service Unavailable",
        };
        f.write_str(text)
    }
}
