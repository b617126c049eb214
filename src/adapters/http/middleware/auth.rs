//! Authentication middleware and extractors for axum.
//!
//! This module provides:
//! - `auth_middleware` - Layer that resolves the session credential and injects the user into extensions
//! - `RequireAuth` - Extractor that requires authentication
//! - `OptionalAuth` - Extractor for optional authentication
//!
//! # Architecture
//!
//! The middleware uses the `SessionValidator` port, so it does not know
//! whether sessions live in Postgres or in a test double.
//!
//! ```text
//! Request → auth_middleware → injects AuthenticatedUser into extensions
//!                                      ↓
//!                              Handler → RequireAuth extractor reads from extensions
//! ```
//!
//! A missing, malformed, expired or unknown credential is not an error here:
//! the request continues anonymously and handlers decide. Only an unreachable
//! session store stops the request, with `offline:auth`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::domain::foundation::{
    AuthError, AuthenticatedUser, DomainError, ErrorCode, SessionToken,
};
use crate::ports::SessionValidator;

/// Auth middleware state.
#[derive(Clone)]
pub struct AuthState {
    validator: Arc<dyn SessionValidator>,
    /// Cookie names checked in order.
    cookie_names: Arc<[String]>,
}

impl AuthState {
    pub fn new(validator: Arc<dyn SessionValidator>, cookie_names: impl Into<Vec<String>>) -> Self {
        let cookie_names: Vec<String> = cookie_names.into();
        Self {
            validator,
            cookie_names: cookie_names.into(),
        }
    }

    /// Session credential carried by a request, if any.
    ///
    /// An `Authorization: Bearer` header wins over cookies.
    pub fn extract_token(&self, headers: &HeaderMap) -> Option<SessionToken> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(token) = bearer {
            return Some(SessionToken::Bearer(token.to_string()));
        }

        self.cookie_names.iter().find_map(|name| {
            cookie_value(headers, name).map(|value| SessionToken::SignedCookie(value.to_string()))
        })
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("cookie_names", &self.cookie_names)
            .finish_non_exhaustive()
    }
}

/// Value of the first cookie called `name` across all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Authentication middleware that resolves session credentials.
///
/// This middleware:
/// 1. Extracts a Bearer token or session cookie
/// 2. Validates it using the `SessionValidator` port
/// 3. On success, injects `AuthenticatedUser` into request extensions
/// 4. On a missing or rejected credential, continues without a user
/// 5. On an unreachable session store, returns `offline:auth`
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = auth.extract_token(request.headers()) else {
        return next.run(request).await;
    };

    match auth.validator.validate(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
        }
        Err(AuthError::ServiceUnavailable(msg)) => {
            tracing::error!("Auth service unavailable: {}", msg);
            return DomainError::new(ErrorCode::OFFLINE_AUTH).into_response();
        }
        Err(e) => {
            tracing::debug!(error = %e, "session rejected; continuing anonymously");
        }
    }

    next.run(request).await
}

/// Extractor that requires authentication.
///
/// Rejects with `unauthorized:chat` when the middleware found no valid session.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = DomainError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .cloned()
                .map(RequireAuth)
                .ok_or_else(DomainError::unauthorized)
        })
    }
}

/// Extractor for optional authentication.
///
/// Returns `None` if no valid session was presented.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl OptionalAuth {
    /// The user, or `unauthorized:chat`.
    pub fn require(self) -> Result<AuthenticatedUser, DomainError> {
        self.0.ok_or_else(DomainError::unauthorized)
    }
}

impl<S> axum::extract::FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user = parts.extensions.get::<AuthenticatedUser>().cloned();
            Ok(OptionalAuth(user))
        })
    }
}
