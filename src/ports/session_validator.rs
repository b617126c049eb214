//! Session validation port.
//!
//! Sessions are issued by an external identity provider. This port only
//! answers "which user does this credential belong to?".
//!
//! # Contract
//!
//! Implementations must:
//! - Verify the cookie signature before touching storage
//! - Reject expired sessions with `AuthError::TokenExpired` or `InvalidToken`
//! - Return `AuthError::ServiceUnavailable` for transient errors

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, SessionToken};

/// Resolves session credentials to users.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a session credential and return the authenticated user.
    ///
    /// # Returns
    ///
    /// * `Ok(AuthenticatedUser)` - Session is valid and unexpired
    /// * `Err(AuthError::InvalidToken)` - Unknown session or bad signature
    /// * `Err(AuthError::ServiceUnavailable)` - Session store unreachable
    async fn validate(&self, token: &SessionToken) -> Result<AuthenticatedUser, AuthError>;
}
