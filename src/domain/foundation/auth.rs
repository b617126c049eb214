//! Authentication types for the domain layer.
//!
//! An [`AuthenticatedUser`] is produced by a `SessionValidator` from a
//! [`SessionToken`] presented by the client. Handlers receive the user; they
//! never see how the session was checked.

use super::UserId;
use thiserror::Error;

/// User resolved from a valid session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Identifier assigned by the session provider.
    pub id: UserId,

    pub email: String,

    /// Display name if the provider has one.
    pub name: Option<String>,

    pub email_verified: bool,
}

impl AuthenticatedUser {
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        name: Option<String>,
        email_verified: bool,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            name,
            email_verified,
        }
    }

    /// Returns the user's display name, or email as fallback.
    pub fn display_name_or_email(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Session credential as presented by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionToken {
    /// Raw session token from an `Authorization: Bearer` header.
    Bearer(String),
    /// Cookie value in `token.signature` form, possibly URL-encoded.
    SignedCookie(String),
}

impl SessionToken {
    /// Raw value as received.
    pub fn raw(&self) -> &str {
        match self {
            SessionToken::Bearer(value) | SessionToken::SignedCookie(value) => value,
        }
    }
}

/// Authentication errors that can occur during session validation.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired session")]
    InvalidToken,

    /// The session exists but has expired.
    #[error("Session expired")]
    TokenExpired,

    /// The session refers to a user that no longer exists.
    #[error("User not found")]
    UserNotFound,

    /// The session store could not be reached.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if the client should sign in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken | AuthError::TokenExpired | AuthError::UserNotFound
        )
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
