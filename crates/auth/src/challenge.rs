//! AuthChallenge payload.
//!
//! # Wire format
//!
//! ```text
//! [tag 0x00][16]   [nonce]
//! [tag 0x01][1]    [options]
//! [tag 0x02][len]  [charset][realm text]    (omitted for the default realm)
//! ```
//!
//! Realm names are always sent as UTF-16BE with charset byte `0xFF`.

use bitflags::bitflags;

use crate::nonce::Nonce;
use crate::{AuthError, NONCE_LEN, tlv};

const TAG_NONCE: u8 = 0x00;
const TAG_OPTIONS: u8 = 0x01;
const TAG_REALM: u8 = 0x02;

/// Charset byte for UTF-16 realm text.
pub const CHARSET_UNICODE: u8 = 0xFF;

bitflags! {
    /// Challenge options sent to the peer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChallengeOptions: u8 {
        /// The peer must include a user id in its response.
        const USER_ID = 0x01;
        /// Full (read/write) access may be granted.
        const FULL_ACCESS = 0x02;
    }
}

/// One realm's challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: Nonce,
    pub options: ChallengeOptions,
    pub realm: Option<String>,
}

impl Challenge {
    pub fn encode(&self) -> Result<Vec<u8>, AuthError> {
        let mut out = Vec::with_capacity(2 + NONCE_LEN + 3 + 2);
        tlv::encode(&mut out, TAG_NONCE, self.nonce.as_bytes())?;
        tlv::encode(&mut out, TAG_OPTIONS, &[self.options.bits()])?;
        if let Some(realm) = &self.realm {
            let mut value = vec![CHARSET_UNICODE];
            value.extend(realm.encode_utf16().flat_map(u16::to_be_bytes));
            tlv::encode(&mut out, TAG_REALM, &value)?;
        }
        Ok(out)
    }

    /// Decodes a challenge (used by clients and tests).
    pub fn decode(buf: &[u8]) -> Result<Self, AuthError> {
        let mut nonce = None;
        let mut options = ChallengeOptions::empty();
        let mut realm = None;

        for item in tlv::decode(buf)? {
            match item.tag {
                TAG_NONCE => {
                    let bytes: [u8; NONCE_LEN] = item.value.try_into().map_err(|_| {
                        AuthError::Malformed(format!("nonce is {} bytes", item.value.len()))
                    })?;
                    nonce = Some(Nonce::from_bytes(bytes));
                }
                TAG_OPTIONS => {
                    if let Some(&bits) = item.value.first() {
                        options = ChallengeOptions::from_bits_truncate(bits);
                    }
                }
                TAG_REALM => realm = Some(decode_realm(item.value)?),
                _ => {}
            }
        }

        let nonce = nonce.ok_or_else(|| AuthError::Malformed("challenge without nonce".into()))?;
        Ok(Self {
            nonce,
            options,
            realm,
        })
    }
}

fn decode_realm(value: &[u8]) -> Result<String, AuthError> {
    let Some((&charset, text)) = value.split_first() else {
        return Ok(String::new());
    };
    if charset == CHARSET_UNICODE {
        if text.len() % 2 != 0 {
            return Err(AuthError::Malformed("odd UTF-16 realm length".into()));
        }
        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units)
            .map_err(|_| AuthError::Malformed("invalid UTF-16 realm".into()));
    }
    // Charset 0 is ASCII, 1..=9 are ISO-8859 variants; decode them lossily.
    Ok(String::from_utf8_lossy(text).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_realm_wire_form() {
        let challenge = Challenge {
            nonce: Nonce::from_bytes([0x11; NONCE_LEN]),
            options: ChallengeOptions::USER_ID | ChallengeOptions::FULL_ACCESS,
            realm: Some("in".into()),
        };
        let wire = challenge.encode().unwrap();
        assert_eq!(&wire[..2], &[0x00, 16]);
        assert_eq!(&wire[18..21], &[0x01, 1, 0x03]);
        assert_eq!(&wire[21..], &[0x02, 5, 0xFF, 0x00, b'i', 0x00, b'n']);
        assert_eq!(Challenge::decode(&wire).unwrap(), challenge);
    }

    #[test]
    fn default_realm_has_no_name() {
        let challenge = Challenge {
            nonce: Nonce::from_bytes([0x22; NONCE_LEN]),
            options: ChallengeOptions::empty(),
            realm: None,
        };
        let wire = challenge.encode().unwrap();
        assert_eq!(wire.len(), 18 + 3);
        assert_eq!(Challenge::decode(&wire).unwrap().realm, None);
    }

    #[test]
    fn overlong_realm_rejected() {
        let challenge = Challenge {
            nonce: Nonce::from_bytes([0; NONCE_LEN]),
            options: ChallengeOptions::empty(),
            realm: Some("r".repeat(200)),
        };
        assert!(challenge.encode().is_err());
    }

    #[test]
    fn short_nonce_rejected() {
        let wire = [0x00, 4, 1, 2, 3, 4];
        assert!(Challenge::decode(&wire).is_err());
    }
}
