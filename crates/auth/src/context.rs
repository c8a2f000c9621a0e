//! Per-session authentication state.

use std::sync::Arc;

use crate::challenge::Challenge;
use crate::nonce::{Nonce, constant_time_eq, digest};
use crate::realm::Realm;
use crate::response::AuthResponse;
use crate::{AuthError, ChallengeOptions};

/// Progress of the challenge-response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoChallenge,
    ChallengeSent,
    Verified,
}

#[derive(Debug)]
struct RealmSlot {
    realm: Realm,
    nonce: Option<Nonce>,
}

/// Authentication state owned by one session.
#[derive(Debug)]
pub struct AuthContext {
    slots: Vec<RealmSlot>,
    state: AuthState,
    user: Option<String>,
}

impl AuthContext {
    /// Creates the context for a session. The realm list is expected to have
    /// passed [`validate_realms`](crate::validate_realms).
    pub fn new(realms: Arc<[Realm]>) -> Self {
        Self {
            slots: realms
                .iter()
                .cloned()
                .map(|realm| RealmSlot { realm, nonce: None })
                .collect(),
            state: AuthState::NoChallenge,
            user: None,
        }
    }

    /// Whether application-level authentication is configured at all.
    pub fn is_required(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_verified(&self) -> bool {
        self.state == AuthState::Verified
    }

    /// User id of the verified peer, if it sent one.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Restarts at `NoChallenge` and forgets all outstanding nonces.
    pub fn reset(&mut self) {
        self.state = AuthState::NoChallenge;
        self.user = None;
        for slot in &mut self.slots {
            slot.nonce = None;
        }
    }

    /// Issues a fresh challenge for every realm.
    ///
    /// Returns one encoded AuthChallenge payload per realm, or nothing when
    /// authentication is not configured or the peer is already verified.
    pub fn challenge(&mut self) -> Result<Vec<Vec<u8>>, AuthError> {
        if !self.is_required() || self.is_verified() {
            return Ok(Vec::new());
        }

        let mut payloads = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            let nonce = Nonce::generate()?;
            slot.nonce = Some(nonce);
            let challenge = Challenge {
                nonce,
                options: slot.realm.options,
                realm: slot.realm.name.clone(),
            };
            payloads.push(challenge.encode()?);
        }

        self.state = AuthState::ChallengeSent;
        tracing::debug!(realms = payloads.len(), "auth challenge issued");
        Ok(payloads)
    }

    /// Verifies an AuthResponse payload.
    ///
    /// Once verified, further responses are accepted without recomputation
    /// until [`reset`](Self::reset). The matched nonce is consumed whether or
    /// not the digest matches; a failure leaves the state at
    /// `ChallengeSent`.
    pub fn verify(&mut self, payload: &[u8]) -> Result<(), AuthError> {
        match self.state {
            AuthState::Verified => return Ok(()),
            AuthState::NoChallenge => return Err(AuthError::NoChallenge),
            AuthState::ChallengeSent => {}
        }

        let response = AuthResponse::decode(payload)?;
        let index = self.find_slot(&response).ok_or(AuthError::UnknownNonce)?;
        let slot = &mut self.slots[index];
        let nonce = slot.nonce.take().ok_or(AuthError::UnknownNonce)?;

        let user = response
            .user_id
            .as_deref()
            .map(|id| String::from_utf8_lossy(id).into_owned());
        if slot.realm.options.contains(ChallengeOptions::USER_ID) && user.is_none() {
            return Err(AuthError::MissingUserId);
        }

        // An unknown user fails exactly like a wrong password.
        let password = slot
            .realm
            .password(user.as_deref())
            .ok_or(AuthError::DigestMismatch)?;
        if !constant_time_eq(&digest(&nonce, &password), &response.digest) {
            return Err(AuthError::DigestMismatch);
        }

        for slot in &mut self.slots {
            slot.nonce = None;
        }
        self.state = AuthState::Verified;
        self.user = user;
        tracing::info!(user = self.user.as_deref().unwrap_or("-"), "peer authenticated");
        Ok(())
    }

    fn find_slot(&self, response: &AuthResponse) -> Option<usize> {
        match &response.nonce {
            Some(echo) => self
                .slots
                .iter()
                .position(|slot| slot.nonce.is_some_and(|n| n.matches(echo))),
            // Without an echo the answer is only unambiguous for one realm.
            None if self.slots.len() == 1 && self.slots[0].nonce.is_some() => Some(0),
            None => None,
        }
    }
}
