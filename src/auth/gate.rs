//! Per-request authorization decisions.
//!
//! The caller's identity is passed in explicitly; nothing here reads
//! ambient session state.

use std::fmt;

/// Username of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn username(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("authentication required")]
pub struct Unauthenticated;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not the owner of this resource")]
pub struct Forbidden;

pub fn require_authenticated(session: Option<Identity>) -> Result<Identity, Unauthenticated> {
    session.ok_or(Unauthenticated)
}

/// Exact username match; there is no admin override.
pub fn require_owner(identity: &Identity, resource_owner: &str) -> Result<(), Forbidden> {
    if identity.username() == resource_owner {
        Ok(())
    } else {
        Err(Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_is_unauthenticated() {
        assert_eq!(require_authenticated(None), Err(Unauthenticated));
        let id = require_authenticated(Some(Identity::new("ada"))).unwrap();
        assert_eq!(id.username(), "ada");
    }

    #[test]
    fn owner_must_match_exactly() {
        let ada = Identity::new("ada");
        assert_eq!(require_owner(&ada, "ada"), Ok(()));
        assert_eq!(require_owner(&ada, "grace"), Err(Forbidden));
        assert_eq!(require_owner(&ada, "Ada"), Err(Forbidden));
        assert_eq!(require_owner(&ada, "ada "), Err(Forbidden));
    }
}
