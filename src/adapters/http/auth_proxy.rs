//! Reverse proxy for `/api/auth/*`.
//!
//! Sign-in, sign-out and session endpoints belong to the external session
//! provider. Requests are forwarded unchanged apart from hop-by-hop headers,
//! and the provider's response (including `Set-Cookie`) is passed back.

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::Response,
    routing::any,
    Router,
};

use crate::domain::foundation::{DomainError, ErrorCode};

/// Largest request body forwarded to the provider.
const MAX_AUTH_BODY_BYTES: usize = 1024 * 1024;

const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn provider_offline(cause: impl Into<String>) -> DomainError {
    DomainError::with_cause(ErrorCode::OFFLINE_AUTH, cause)
}

/// State for the auth proxy.
#[derive(Debug, Clone)]
pub struct AuthProxyState {
    client: reqwest::Client,
    provider_url: Option<String>,
}

impl AuthProxyState {
    /// Proxy to `provider_url`; `None` answers every request with `offline:auth`.
    ///
    /// Redirects are handed to the browser rather than followed.
    pub fn new(provider_url: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            provider_url: provider_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }
}

/// ANY /api/auth/* - Forward to the session provider
pub async fn proxy_auth(
    State(state): State<AuthProxyState>,
    request: Request,
) -> Result<Response, DomainError> {
    let Some(base) = state.provider_url.as_deref() else {
        return Err(provider_offline("no session provider configured"));
    };

    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", base, path);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| DomainError::bad_request(e.to_string()))?;
    let body = axum::body::to_bytes(body, MAX_AUTH_BODY_BYTES)
        .await
        .map_err(|e| DomainError::bad_request(e.to_string()))?;

    let mut upstream = state.client.request(method, &url);
    for (name, value) in parts.headers.iter() {
        if !is_hop_by_hop(name.as_str()) {
            upstream = upstream.header(name.as_str(), value.as_bytes());
        }
    }

    let response = upstream.body(body).send().await.map_err(|e| {
        tracing::warn!(error = %e, %url, "session provider unreachable");
        provider_offline("session provider unreachable")
    })?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if !is_hop_by_hop(name.as_str()) {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| provider_offline(e.to_string()))?;
    builder
        .body(Body::from(bytes))
        .map_err(|e| provider_offline(e.to_string()))
}

/// Router for `/api/auth/*`.
pub fn auth_proxy_router(state: AuthProxyState) -> Router {
    Router::new()
        .route("/api/auth/*rest", any(proxy_auth))
        .with_state(state)
}
