//! Realms and their credential stores.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::AuthError;
use crate::challenge::ChallengeOptions;

/// Longest realm name that fits a challenge element (UTF-16 code units).
const MAX_REALM_UNITS: usize = (u8::MAX as usize - 1) / 2;

/// Password lookup backing one realm.
pub trait CredentialStore: Send + Sync {
    /// Returns the password for `user`, or for the anonymous user when
    /// `user` is `None`.
    fn password(&self, user: Option<&str>) -> Option<String>;
}

/// In-memory credentials, usually loaded from a `user:password` file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
    anonymous: Option<String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(user.into(), password.into());
        self
    }

    pub fn with_anonymous(mut self, password: impl Into<String>) -> Self {
        self.anonymous = Some(password.into());
        self
    }

    /// Parses `user:password` lines.
    ///
    /// Blank lines and `#` comments are skipped. A line without `:` sets the
    /// password for peers that send no user id.
    pub fn parse(text: &str) -> Self {
        let mut creds = Self::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match line.split_once(':') {
                Some((user, password)) => {
                    creds.users.insert(user.to_string(), password.to_string());
                }
                None => creds.anonymous = Some(line.to_string()),
            }
        }
        creds
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let text = std::fs::read_to_string(path)?;
        let creds = Self::parse(&text);
        tracing::debug!(
            path = %path.display(),
            users = creds.users.len(),
            anonymous = creds.anonymous.is_some(),
            "credentials loaded"
        );
        Ok(creds)
    }
}

impl CredentialStore for Credentials {
    fn password(&self, user: Option<&str>) -> Option<String> {
        match user {
            Some(user) => self.users.get(user).cloned(),
            None => self.anonymous.clone(),
        }
    }
}

/// An authentication namespace with its own credentials.
#[derive(Clone)]
pub struct Realm {
    pub name: Option<String>,
    pub options: ChallengeOptions,
    store: Arc<dyn CredentialStore>,
}

impl Realm {
    pub fn new(
        name: Option<String>,
        options: ChallengeOptions,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            name,
            options,
            store,
        }
    }

    pub fn password(&self, user: Option<&str>) -> Option<String> {
        self.store.password(user)
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Checks a realm list: at most one unnamed (default) realm, unique names
/// that fit the challenge encoding.
pub fn validate_realms(realms: &[Realm]) -> Result<(), AuthError> {
    let mut seen = HashSet::new();
    let mut unnamed = 0;
    for realm in realms {
        match &realm.name {
            None => unnamed += 1,
            Some(name) => {
                if name.encode_utf16().count() > MAX_REALM_UNITS {
                    return Err(AuthError::InvalidRealms(format!("realm name too long: {name}")));
                }
                if !seen.insert(name.as_str()) {
                    return Err(AuthError::InvalidRealms(format!("duplicate realm: {name}")));
                }
            }
        }
    }
    if unnamed > 1 {
        return Err(AuthError::InvalidRealms(
            "only one realm may omit its name".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(name: Option<&str>) -> Realm {
        Realm::new(
            name.map(String::from),
            ChallengeOptions::empty(),
            Arc::new(Credentials::new()),
        )
    }

    #[test]
    fn parse_credentials_file() {
        let creds = Credentials::parse("# users\nalice:wonder:land\n\nguestpass\r\nbob:\n");
        assert_eq!(creds.password(Some("alice")).as_deref(), Some("wonder:land"));
        assert_eq!(creds.password(Some("bob")).as_deref(), Some(""));
        assert_eq!(creds.password(None).as_deref(), Some("guestpass"));
        assert_eq!(creds.password(Some("carol")), None);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds");
        std::fs::write(&path, "alice:pw\n").unwrap();
        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.password(Some("alice")).as_deref(), Some("pw"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = Credentials::load(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(AuthError::Io(_))));
    }

    #[test]
    fn one_default_realm_allowed() {
        assert!(validate_realms(&[realm(None), realm(Some("a"))]).is_ok());
        assert!(validate_realms(&[realm(None), realm(None)]).is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        assert!(validate_realms(&[realm(Some("a")), realm(Some("a"))]).is_err());
    }

    #[test]
    fn long_names_rejected() {
        let long = "x".repeat(MAX_REALM_UNITS + 1);
        assert!(validate_realms(&[realm(Some(&long))]).is_err());
    }
}
