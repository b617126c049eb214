//! Top-level router: every module router plus the cross-cutting layers.
//!
//! Layers, outermost first:
//! 1. `SetRequestIdLayer` - assigns `x-request-id` when the client sent none
//! 2. `TraceLayer` - one span per request, tagged with the request id
//! 3. `PropagateRequestIdLayer` - echoes `x-request-id` on the response
//! 4. `CorsLayer` - configured origins, credentials allowed
//! 5. `TimeoutLayer` - bounds the time to response headers, not the SSE body
//! 6. `auth_middleware` - chat routes only

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;

use super::auth_proxy::{auth_proxy_router, AuthProxyState};
use super::chat::{chat_router, ChatAppState};
use super::middleware::{auth_middleware, AuthState};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Everything the HTTP layer needs.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatAppState,
    pub auth: AuthState,
    pub auth_proxy: AuthProxyState,
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, cross-origin requests are denied");
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            HeaderName::from_static("last-event-id"),
        ])
        .allow_credentials(true)
}

/// Build the application router.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let api = chat_router()
        .with_state(state.chat)
        .layer(middleware::from_fn_with_state(state.auth, auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .merge(auth_proxy_router(state.auth_proxy))
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(build_cors_layer(&server.cors_origins_list()))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{InvocationSettings, MockLanguageModel, ModelInvoker, NoTools};
    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::memory::InMemoryChatRepository;
    use crate::application::handlers::StreamChatSettings;
    use crate::ports::StreamResumption;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let invoker = ModelInvoker::new(
            Arc::new(MockLanguageModel::new()),
            Arc::new(NoTools),
            InvocationSettings::default(),
        );
        let state = AppState {
            chat: ChatAppState {
                repository: Arc::new(InMemoryChatRepository::new()),
                invoker,
                resumption: StreamResumption::Disabled,
                settings: StreamChatSettings::default(),
            },
            auth: AuthState::new(
                Arc::new(MockSessionValidator::new()),
                vec!["better-auth.session_token".to_string()],
            ),
            auth_proxy: AuthProxyState::new(None, Duration::from_secs(1)).unwrap(),
        };
        build_router(state, &ServerConfig::default())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn request_id_is_generated_and_echoed() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-42");
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/chat")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = app()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
