//! Session validator backed by the auth provider's session table.
//!
//! The auth provider shares this database. It writes one row per session
//! into `"session"` and hands the browser a cookie of the form
//! `<token>.<base64 HMAC-SHA256(secret, token)>`, URL-encoded. Validation:
//!
//! 1. URL-decode the cookie and split off the signature
//! 2. Recompute the HMAC and compare in constant time
//! 3. Look the token up in `"session"` joined with `"user"`
//! 4. Reject expired sessions
//!
//! Bearer tokens skip the signature step; they are the raw session token.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use sqlx::{PgPool, Row};
use subtle::ConstantTimeEq;

use crate::domain::foundation::{AuthError, AuthenticatedUser, SessionToken, UserId};
use crate::ports::SessionValidator;

/// Length of a base64-encoded SHA-256 MAC.
const SIGNATURE_LEN: usize = 44;

/// Session validator reading the shared session table.
pub struct PostgresSessionValidator {
    pool: PgPool,
    secret: Secret<String>,
}

impl PostgresSessionValidator {
    pub fn new(pool: PgPool, secret: Secret<String>) -> Self {
        Self { pool, secret }
    }

    /// Extract the session token from a signed cookie value.
    fn verify_cookie(&self, value: &str) -> Result<String, AuthError> {
        verify_signed_value(self.secret.expose_secret(), value)
    }
}

/// Verifies a `token.signature` cookie value and returns the token.
pub fn verify_signed_value(secret: &str, value: &str) -> Result<String, AuthError> {
    let decoded = urlencoding::decode(value).map_err(|_| AuthError::InvalidToken)?;

    let (token, signature) = decoded.rsplit_once('.').ok_or(AuthError::InvalidToken)?;
    if token.is_empty() || signature.len() != SIGNATURE_LEN || !signature.ends_with('=') {
        return Err(AuthError::InvalidToken);
    }

    let provided = STANDARD
        .decode(signature)
        .map_err(|_| AuthError::InvalidToken)?;
    let expected = compute_signature(secret, token)?;

    if !constant_time_compare(&provided, &expected) {
        tracing::debug!("session cookie signature mismatch");
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}

/// Signs a session token the way the auth provider does.
pub fn sign_value(secret: &str, token: &str) -> Result<String, AuthError> {
    let signature = compute_signature(secret, token)?;
    Ok(format!("{}.{}", token, STANDARD.encode(signature)))
}

fn compute_signature(secret: &str, token: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::service_unavailable("invalid session secret"))?;
    mac.update(token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[async_trait]
impl SessionValidator for PostgresSessionValidator {
    async fn validate(&self, token: &SessionToken) -> Result<AuthenticatedUser, AuthError> {
        let raw = match token {
            SessionToken::SignedCookie(value) => self.verify_cookie(value)?,
            SessionToken::Bearer(value) if !value.is_empty() => value.clone(),
            SessionToken::Bearer(_) => return Err(AuthError::InvalidToken),
        };

        let row = sqlx::query(
            r#"
            SELECT s."expiresAt", u.id, u.email, u.name, u."emailVerified"
            FROM "session" s
            JOIN "user" u ON u.id = s."userId"
            WHERE s.token = $1
            "#,
        )
        .bind(&raw)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "session lookup failed");
            AuthError::service_unavailable(e.to_string())
        })?
        .ok_or(AuthError::InvalidToken)?;

        let expires_at: DateTime<Utc> = row.get("expiresAt");
        if expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        let id: String = row.get("id");
        let user_id = UserId::new(&id).map_err(|_| {
            tracing::warn!("session refers to an invalid user id");
            AuthError::UserNotFound
        })?;

        Ok(AuthenticatedUser::new(
            user_id,
            row.get::<String, _>("email"),
            row.get::<Option<String>, _>("name"),
            row.get::<bool, _>("emailVerified"),
        ))
    }
}

impl std::fmt::Debug for PostgresSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSessionValidator").finish_non_exhaustive()
    }
}
