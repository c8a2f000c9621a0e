//! AuthResponse payload.
//!
//! # Wire format
//!
//! ```text
//! [tag 0x00][16]  [digest]
//! [tag 0x01][len] [user id]       optional
//! [tag 0x02][16]  [nonce echo]    optional when only one challenge was sent
//! ```

use crate::nonce::Nonce;
use crate::{AuthError, DIGEST_LEN, NONCE_LEN, tlv};

const TAG_DIGEST: u8 = 0x00;
const TAG_USER_ID: u8 = 0x01;
const TAG_NONCE: u8 = 0x02;

/// A decoded AuthResponse header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub digest: [u8; DIGEST_LEN],
    pub user_id: Option<Vec<u8>>,
    pub nonce: Option<[u8; NONCE_LEN]>,
}

impl AuthResponse {
    /// Builds the response a client would send for `nonce` and `password`.
    pub fn answer(nonce: &Nonce, password: &str, user_id: Option<&[u8]>) -> Self {
        Self {
            digest: crate::digest(nonce, password),
            user_id: user_id.map(<[u8]>::to_vec),
            nonce: Some(*nonce.as_bytes()),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, AuthError> {
        let mut digest = None;
        let mut user_id = None;
        let mut nonce = None;

        for item in tlv::decode(buf)? {
            match item.tag {
                TAG_DIGEST => digest = Some(fixed::<DIGEST_LEN>("digest", item.value)?),
                TAG_USER_ID => user_id = Some(item.value.to_vec()),
                TAG_NONCE => nonce = Some(fixed::<NONCE_LEN>("nonce", item.value)?),
                _ => {}
            }
        }

        let digest = digest.ok_or_else(|| AuthError::Malformed("response without digest".into()))?;
        Ok(Self {
            digest,
            user_id,
            nonce,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, AuthError> {
        let mut out = Vec::new();
        tlv::encode(&mut out, TAG_DIGEST, &self.digest)?;
        if let Some(user) = &self.user_id {
            tlv::encode(&mut out, TAG_USER_ID, user)?;
        }
        if let Some(nonce) = &self.nonce {
            tlv::encode(&mut out, TAG_NONCE, nonce)?;
        }
        Ok(out)
    }
}

fn fixed<const N: usize>(what: &str, value: &[u8]) -> Result<[u8; N], AuthError> {
    value
        .try_into()
        .map_err(|_| AuthError::Malformed(format!("{what} is {} bytes, expected {N}", value.len())))
}
