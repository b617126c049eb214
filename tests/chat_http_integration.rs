//! Integration tests for the chat HTTP surface.
//!
//! The full router runs against the in-memory repository, the scripted model
//! and the mock session validator.

mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use chat_relay::adapters::ai::MockLanguageModel;
use chat_relay::adapters::memory::InMemoryChatRepository;
use chat_relay::application::handlers::StreamChatSettings;
use chat_relay::domain::chat::{Chat, ChatMessage, MessagePart, Project, Visibility};
use chat_relay::domain::foundation::{ChatId, MessageId, Timestamp, UserId};
use chat_relay::ports::{ChatRepository, ModelError, StreamResumption};

use common::*;

fn post(body: serde_json::Value, token: Option<&str>) -> axum::http::Request<axum::body::Body> {
    request(
        Method::POST,
        "/api/chat",
        token,
        Some(serde_json::to_vec(&body).unwrap()),
    )
}

/// Seeds chat `c1` owned by `owner` with three user messages.
async fn seed_chat(repo: &InMemoryChatRepository, owner: &str, visibility: Visibility) {
    let owner = UserId::new(owner).unwrap();
    let project = Project::untitled(owner.clone());
    repo.create_project(&project).await.unwrap();

    let chat_id = ChatId::new("c1").unwrap();
    repo.create_chat(&Chat::untitled(chat_id.clone(), owner, visibility, project.id))
        .await
        .unwrap();

    let base = Timestamp::now();
    let messages: Vec<ChatMessage> = (1..=3)
        .map(|i| {
            let mut message = ChatMessage::user(
                MessageId::new(format!("m{}", i)).unwrap(),
                chat_id.clone(),
                vec![MessagePart::text(format!("message {}", i))],
            );
            message.created_at = base.plus_micros(i);
            message
        })
        .collect();
    repo.append_messages(&messages).await.unwrap();
}

// =============================================================================
// POST /api/chat
// =============================================================================

#[tokio::test]
async fn fresh_chat_streams_and_persists_both_messages() {
    let app = test_app(
        MockLanguageModel::new().with_text_step("Hello there friend"),
        StreamResumption::Disabled,
    );

    let response = send(&app, post(chat_body("c1", "m1", "hi"), Some(TOKEN_U1))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let frames = parse_sse(&body_text(response).await);
    let last = frames.last().unwrap();
    assert!(last.is_done());
    assert_eq!(last.id, None);

    let numbered = &frames[..frames.len() - 1];
    for (seq, frame) in numbered.iter().enumerate() {
        assert_eq!(frame.id, Some(seq as u64));
    }
    assert_eq!(numbered[0].json()["type"], "start");
    assert_eq!(numbered.last().unwrap().json()["type"], "finish");

    let text: String = numbered
        .iter()
        .map(|f| f.json())
        .filter(|v| v["type"] == "text-delta")
        .map(|v| v["delta"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(text, "Hello there friend");

    // The body ends only after the reply is persisted.
    let (status, chat) = json_of(send(&app, request(Method::GET, "/api/chat/c1", Some(TOKEN_U1), None)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["userId"], "u1");
    assert_eq!(chat["title"], "Untitled");
    assert_eq!(chat["visibility"], "private");

    let (_, messages) = json_of(
        send(&app, request(Method::GET, "/api/chat/c1/messages", Some(TOKEN_U1), None)).await,
    )
    .await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["id"], "m1");
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(
        messages[1]["id"],
        numbered[0].json()["messageId"],
        "persisted reply uses the announced id"
    );
    assert_eq!(app.repo.chat_count().await, 1);
}

#[tokio::test]
async fn malformed_body_is_rejected_before_session_check() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);

    let response = send(
        &app,
        request(Method::POST, "/api/chat", None, Some(b"{\"id\":".to_vec())),
    )
    .await;
    let (status, body) = json_of(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request:api");
    assert_eq!(app.repo.chat_count().await, 0);
}

#[tokio::test]
async fn invalid_shape_is_bad_request() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    let mut body = chat_body("c1", "m1", "hi");
    body["message"]["parts"] = json!([{ "type": "file", "mediaType": "application/pdf", "url": "https://x/y.pdf" }]);

    let (status, body) = json_of(send(&app, post(body, Some(TOKEN_U1))).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request:api");
    assert_eq!(app.repo.message_count().await, 0);
}

#[tokio::test]
async fn missing_or_invalid_session_writes_nothing() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);

    for token in [None, Some("not-a-session")] {
        let (status, body) = json_of(send(&app, post(chat_body("c1", "m1", "hi"), token)).await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized:chat");
    }

    assert_eq!(app.repo.chat_count().await, 0);
    assert_eq!(app.repo.message_count().await, 0);
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn foreign_chat_is_forbidden_and_untouched() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, body) = json_of(send(&app, post(chat_body("c1", "m9", "hi"), Some(TOKEN_U2))).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden:chat");
    assert_eq!(app.repo.message_count().await, 3);
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn billing_failure_maps_to_activate_gateway() {
    let app = test_app(
        MockLanguageModel::new().with_open_error(ModelError::billing_required("add a card")),
        StreamResumption::Disabled,
    );

    let (status, body) = json_of(send(&app, post(chat_body("c1", "m1", "hi"), Some(TOKEN_U1))).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request:activate_gateway");
}

#[tokio::test]
async fn provider_outage_is_offline_chat() {
    let app = test_app(
        MockLanguageModel::new().with_open_error(ModelError::unavailable("upstream 503")),
        StreamResumption::Disabled,
    );

    let (status, body) = json_of(send(&app, post(chat_body("c1", "m1", "hi"), Some(TOKEN_U1))).await).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "offline:chat");
}

#[tokio::test]
async fn daily_quota_limits_messages() {
    let app = test_app_with(
        MockLanguageModel::new(),
        StreamResumption::Disabled,
        InMemoryChatRepository::new(),
        StreamChatSettings {
            daily_message_quota: Some(1),
            forward_reasoning: true,
        },
    );

    for message_id in ["m1", "m2"] {
        let response = send(&app, post(chat_body("c1", message_id, "hi"), Some(TOKEN_U1))).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;
    }

    let (status, body) = json_of(send(&app, post(chat_body("c1", "m3", "hi"), Some(TOKEN_U1))).await).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limit:chat");
}

#[tokio::test]
async fn reply_is_persisted_after_client_disconnects() {
    let app = test_app(
        MockLanguageModel::new()
            .with_text_step("a slow reply that keeps going")
            .with_event_delay(std::time::Duration::from_millis(5)),
        StreamResumption::Disabled,
    );

    let response = send(&app, post(chat_body("c1", "m1", "hi"), Some(TOKEN_U1))).await;
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);

    let repo = app.repo.clone();
    eventually(|| {
        let repo = repo.clone();
        async move { repo.message_count().await == 2 }
    })
    .await;

    let messages = app
        .repo
        .list_messages(&ChatId::new("c1").unwrap())
        .await
        .unwrap();
    assert_eq!(messages[1].text_content(), "a slow reply that keeps going");
}

// =============================================================================
// Reads and mutations
// =============================================================================

#[tokio::test]
async fn unknown_chat_reads_as_null() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    let (status, body) = json_of(send(&app, request(Method::GET, "/api/chat/nope", None, None)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn private_chat_requires_its_owner() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, _) = json_of(send(&app, request(Method::GET, "/api/chat/c1/messages", None, None)).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_of(
        send(&app, request(Method::GET, "/api/message/m1", Some(TOKEN_U2), None)).await,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn visibility_update_is_idempotent() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    for _ in 0..2 {
        let response = send(
            &app,
            request(
                Method::PATCH,
                "/api/chat/c1/visibility",
                Some(TOKEN_U1),
                Some(br#"{"visibility":"public"}"#.to_vec()),
            ),
        )
        .await;
        let (status, body) = json_of(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }

    // Public now, so readable without a session.
    let (status, body) = json_of(send(&app, request(Method::GET, "/api/chat/c1", None, None)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visibility"], "public");
}

#[tokio::test]
async fn visibility_update_rejects_other_users() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, body) = json_of(
        send(
            &app,
            request(
                Method::PATCH,
                "/api/chat/c1/visibility",
                Some(TOKEN_U2),
                Some(br#"{"visibility":"public"}"#.to_vec()),
            ),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden:chat");
}

#[tokio::test]
async fn trailing_delete_keeps_earlier_messages() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, body) = json_of(
        send(&app, request(Method::DELETE, "/api/message/m2/trailing", Some(TOKEN_U1), None)).await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (_, messages) = json_of(
        send(&app, request(Method::GET, "/api/chat/c1/messages", Some(TOKEN_U1), None)).await,
    )
    .await;
    let ids: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["m1"]);
}

#[tokio::test]
async fn trailing_delete_of_unknown_message_deletes_nothing() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, body) = json_of(
        send(&app, request(Method::DELETE, "/api/message/ghost/trailing", Some(TOKEN_U1), None)).await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request:database");
    assert!(body.get("cause").is_none());
    assert_eq!(app.repo.message_count().await, 3);
}

#[tokio::test]
async fn trailing_delete_requires_a_session() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    seed_chat(&app.repo, "u1", Visibility::Private).await;

    let (status, body) = json_of(
        send(&app, request(Method::DELETE, "/api/message/m2/trailing", None, None)).await,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized:chat");
    assert_eq!(app.repo.message_count().await, 3);
}

#[tokio::test]
async fn missing_message_is_not_found() {
    let app = test_app(MockLanguageModel::new(), StreamResumption::Disabled);
    let (status, body) = json_of(send(&app, request(Method::GET, "/api/message/ghost", None, None)).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found:chat");
}
