//! Tag-length-value codec for AuthChallenge/AuthResponse payloads.
//!
//! # Wire format
//!
//! ```text
//! repeated: [1 byte: tag][1 byte: length][length bytes: value]
//! ```
//!
//! Every length byte is checked against the remaining buffer before the
//! value is sliced out.

use crate::AuthError;

/// One decoded element, borrowing its value from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Decodes all elements in `buf`.
pub fn decode(buf: &[u8]) -> Result<Vec<Tlv<'_>>, AuthError> {
    let mut out = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(AuthError::Malformed(format!(
                "dangling {} byte(s) after last element",
                rest.len()
            )));
        }
        let tag = rest[0];
        let len = rest[1] as usize;
        let end = 2 + len;
        if rest.len() < end {
            return Err(AuthError::Malformed(format!(
                "tag {tag} declares {len} bytes, {} available",
                rest.len() - 2
            )));
        }
        out.push(Tlv {
            tag,
            value: &rest[2..end],
        });
        rest = &rest[end..];
    }
    Ok(out)
}

/// Appends one element to `out`.
pub fn encode(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), AuthError> {
    if value.len() > u8::MAX as usize {
        return Err(AuthError::Malformed(format!(
            "tag {tag} value too long: {} bytes",
            value.len()
        )));
    }
    out.push(tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    Ok(())
}
