//! OBEX digest authentication.
//!
//! The server challenges a peer during CONNECT with one AuthChallenge header
//! per configured realm. Each carries a fresh 16-byte nonce; the peer answers
//! with `MD5(nonce ":" password)` in an AuthResponse header. Nonces are
//! single-use and replaced on every new challenge.
//!
//! # Wire format
//!
//! See [`tlv`] for the tag-length-value layout shared by challenges and
//! responses.

pub mod challenge;
pub mod context;
pub mod nonce;
pub mod realm;
pub mod response;
pub mod tlv;

pub use challenge::{Challenge, ChallengeOptions};
pub use context::{AuthContext, AuthState};
pub use nonce::{Nonce, digest};
pub use realm::{CredentialStore, Credentials, Realm, validate_realms};
pub use response::AuthResponse;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// MD5 digest length in bytes.
pub const DIGEST_LEN: usize = 16;

/// Errors produced by the authentication subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed auth data: {0}")]
    Malformed(String),

    #[error("nonce generation failed")]
    NonceUnavailable,

    #[error("no challenge outstanding")]
    NoChallenge,

    #[error("response names an unknown nonce")]
    UnknownNonce,

    #[error("user id required")]
    MissingUserId,

    #[error("digest mismatch")]
    DigestMismatch,

    #[error("invalid realm configuration: {0}")]
    InvalidRealms(String),
}
