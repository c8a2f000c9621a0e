//! Nonce generation and digest computation.

use md5::{Digest, Md5};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::{AuthError, DIGEST_LEN, NONCE_LEN};

/// A single-use 16-byte challenge nonce.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Draws a nonce from the operating system CSPRNG.
    pub fn generate() -> Result<Self, AuthError> {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| AuthError::NonceUnavailable)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Compares against wire bytes in constant time.
    pub fn matches(&self, other: &[u8]) -> bool {
        constant_time_eq(&self.0, other)
    }
}

// Nonces are secrets until answered; keep them out of logs.
impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce(..)")
    }
}

/// Computes `MD5(nonce ":" password)`.
pub fn digest(nonce: &Nonce, password: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Constant-time comparison of two byte strings.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
