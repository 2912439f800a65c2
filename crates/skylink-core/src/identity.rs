//! Connection identity.
//!
//! Every connection announces itself to the broker with a string of the
//! form `<role>:<vhost>:<secret>:<session>`. The session part is a fresh
//! UUID v4 per engine instance, so two clients sharing credentials still
//! get distinct routing identities.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Which engine the identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Request/response client.
    Requester,
    /// Long-lived worker subscription.
    Dealer,
}

impl Role {
    /// Prefix used in the identity string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "req",
            Role::Dealer => "dlr",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected identity inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("vhost must not be empty")]
    EmptyVhost,

    #[error("secret must not be empty")]
    EmptySecret,
}

/// An immutable connection identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    role: Role,
    vhost: String,
    value: String,
}

impl Identity {
    /// Build an identity with a freshly generated session id.
    pub fn generate(role: Role, vhost: &str, secret: &str) -> Result<Self, IdentityError> {
        let session = Uuid::new_v4().hyphenated().to_string();
        Self::with_session(role, vhost, secret, &session)
    }

    /// Build an identity from explicit parts.
    pub fn with_session(
        role: Role,
        vhost: &str,
        secret: &str,
        session: &str,
    ) -> Result<Self, IdentityError> {
        if vhost.is_empty() {
            return Err(IdentityError::EmptyVhost);
        }
        if secret.is_empty() {
            return Err(IdentityError::EmptySecret);
        }

        Ok(Self {
            role,
            vhost: vhost.to_string(),
            value: format!("{}:{vhost}:{secret}:{session}", role.as_str()),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    /// The full identity string sent to the broker.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
