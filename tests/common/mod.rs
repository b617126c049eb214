//! Shared harness for HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use chat_relay::adapters::ai::{InvocationSettings, MockLanguageModel, ModelInvoker, NoTools};
use chat_relay::adapters::auth::MockSessionValidator;
use chat_relay::adapters::http::{build_router, AppState, AuthProxyState, AuthState, ChatAppState};
use chat_relay::adapters::memory::InMemoryChatRepository;
use chat_relay::application::handlers::StreamChatSettings;
use chat_relay::config::ServerConfig;
use chat_relay::domain::foundation::{AuthenticatedUser, UserId};
use chat_relay::ports::StreamResumption;

pub const TOKEN_U1: &str = "tok-u1";
pub const TOKEN_U2: &str = "tok-u2";

pub fn user(id: &str) -> AuthenticatedUser {
    AuthenticatedUser::new(
        UserId::new(id).unwrap(),
        format!("{}@example.com", id),
        None,
        true,
    )
}

pub struct TestApp {
    pub router: Router,
    pub repo: InMemoryChatRepository,
    pub model: MockLanguageModel,
}

pub fn test_app(model: MockLanguageModel, resumption: StreamResumption) -> TestApp {
    test_app_with(
        model,
        resumption,
        InMemoryChatRepository::new(),
        StreamChatSettings::default(),
    )
}

pub fn test_app_with(
    model: MockLanguageModel,
    resumption: StreamResumption,
    repo: InMemoryChatRepository,
    settings: StreamChatSettings,
) -> TestApp {
    let invoker = ModelInvoker::new(
        Arc::new(model.clone()),
        Arc::new(NoTools),
        InvocationSettings {
            smoothing_delay: Duration::ZERO,
            ..InvocationSettings::default()
        },
    );
    let validator = MockSessionValidator::new()
        .with_user(TOKEN_U1, user("u1"))
        .with_user(TOKEN_U2, user("u2"));

    let state = AppState {
        chat: ChatAppState {
            repository: Arc::new(repo.clone()),
            invoker,
            resumption,
            settings,
        },
        auth: AuthState::new(
            Arc::new(validator),
            vec!["better-auth.session_token".to_string()],
        ),
        auth_proxy: AuthProxyState::new(None, Duration::from_secs(1)).unwrap(),
    };

    TestApp {
        router: build_router(state, &ServerConfig::default()),
        repo,
        model,
    }
}

pub fn chat_body(chat_id: &str, message_id: &str, text: &str) -> Value {
    json!({
        "id": chat_id,
        "message": {
            "id": message_id,
            "role": "user",
            "parts": [{ "type": "text", "text": text }]
        },
        "selectedChatModel": "chat-model",
        "selectedVisibilityType": "private"
    })
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Vec<u8>>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(bytes) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json_of(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let text = body_text(response).await;
    (status, serde_json::from_str(&text).unwrap())
}

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub id: Option<u64>,
    pub data: String,
}

impl SseFrame {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).unwrap()
    }

    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Parses an SSE body, skipping keep-alive comments.
pub fn parse_sse(body: &str) -> Vec<SseFrame> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut id = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("id:") {
                    id = Some(value.trim().parse().unwrap());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = Some(value.trim_start().to_string());
                }
            }
            data.map(|data| SseFrame { id, data })
        })
        .collect()
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
