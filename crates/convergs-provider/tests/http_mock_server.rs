use std::time::Duration;

use convergs_provider::{AgentBackend, AgentError, AgentErrorKind, BackendConfig, HttpAgentBackend};
use convergs_schema::SendMessageRequest;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn create_session_posts_initial_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"initial_prompt": "You are Emma"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session_id": "abc-123"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let created = backend.create_session(Some("You are Emma")).await.unwrap();
    assert_eq!(created.session_id, "abc-123");
}

#[tokio::test]
async fn create_session_without_prompt_sends_empty_object() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(body_json(serde_json::json!({})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session_id": "s-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    assert_eq!(backend.create_session(None).await.unwrap().session_id, "s-1");
}

#[tokio::test]
async fn create_session_rejection_is_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"detail": "agent pool exhausted"})),
        )
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let err = backend.create_session(None).await.unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::Service);
    match err {
        AgentError::Service { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "agent pool exhausted");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_session_with_empty_id_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session_id": ""})),
        )
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let err = backend.create_session(None).await.unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::Service);
}

#[tokio::test]
async fn send_message_round_trip_with_qualification() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/message"))
        .and(body_json(serde_json::json!({
            "text": "We need 50 agents",
            "session_id": "abc-123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "response": "Great, what's your timeline?",
            "qualification": {"business_type": "enterprise"},
            "qualification_complete": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let resp = backend
        .send_message(&SendMessageRequest::new("abc-123", "We need 50 agents"))
        .await
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.response, "Great, what's your timeline?");
    assert_eq!(
        resp.qualification
            .as_ref()
            .and_then(|q| q.get("business_type"))
            .map(String::as_str),
        Some("enterprise")
    );
    assert_eq!(resp.qualification_complete, Some(false));
}

#[tokio::test]
async fn null_qualification_entry_keeps_the_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "response": "Great, what's your timeline?",
            "qualification": {"business_type": "enterprise", "urgency": null},
            "qualification_complete": false
        })))
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let resp = backend
        .send_message(&SendMessageRequest::new("abc-123", "We need 50 agents"))
        .await
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.response, "Great, what's your timeline?");
    let fields = resp.qualification.unwrap();
    assert_eq!(fields.get("business_type").map(String::as_str), Some("enterprise"));
    assert!(!fields.contains_key("urgency"));
}

#[tokio::test]
async fn unsuccessful_reply_is_returned_not_raised() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": false, "response": ""})),
        )
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let resp = backend
        .send_message(&SendMessageRequest::new("abc", "hi"))
        .await
        .unwrap();
    assert!(!resp.success);
}

#[tokio::test]
async fn malformed_body_is_network_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    let err = backend
        .send_message(&SendMessageRequest::new("abc", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::Network);
}

#[tokio::test]
async fn bearer_token_is_sent_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(header("authorization", "Bearer demo-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session_id": "s-9"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::http(server.uri()).with_api_token("demo-token");
    let backend = HttpAgentBackend::from_config(&config);
    assert_eq!(backend.create_session(None).await.unwrap().session_id, "s-9");
}

#[tokio::test]
async fn slow_backend_times_out_as_network_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": true, "response": "late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::with_timeout(server.uri(), Duration::from_millis(50));
    let err = backend
        .send_message(&SendMessageRequest::new("abc", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::Network);
}

#[tokio::test]
async fn health_checks_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = HttpAgentBackend::new(server.uri());
    assert!(backend.health().await.is_ok());
}
