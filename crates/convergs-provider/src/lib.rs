pub mod error;
pub mod http;
pub mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use convergs_schema::{CreateSessionResponse, SendMessageRequest, SendMessageResponse};
use serde::{Deserialize, Serialize};

pub use error::{AgentError, AgentErrorKind};
pub use http::HttpAgentBackend;
pub use stub::StubAgentBackend;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request/response contract of the remote conversation service.
///
/// One attempt per call. Callers decide what a failure means for their own
/// state; implementations never retry.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Open a new conversation, optionally seeded with a persona instruction.
    async fn create_session(
        &self,
        initial_prompt: Option<&str>,
    ) -> Result<CreateSessionResponse, AgentError>;

    /// Exchange one chat turn inside a live session.
    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, AgentError>;

    async fn health(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Reject requests the backend would refuse anyway.
pub fn validate_send_request(request: &SendMessageRequest) -> Result<(), AgentError> {
    if request.text.trim().is_empty() {
        return Err(AgentError::Validation("message text is empty".into()));
    }
    if request.session_id.trim().is_empty() {
        return Err(AgentError::Validation("session id is empty".into()));
    }
    Ok(())
}

// ============================================================
// Backend Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Http,
    /// Offline scripted backend, no network.
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Http,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_token: None,
        }
    }
}

impl BackendConfig {
    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn stub() -> Self {
        Self {
            kind: BackendKind::Stub,
            ..Self::default()
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

/// Create a backend from configuration.
pub fn create_backend(config: &BackendConfig) -> Arc<dyn AgentBackend> {
    let backend: Arc<dyn AgentBackend> = match config.kind {
        BackendKind::Http => Arc::new(HttpAgentBackend::from_config(config)),
        BackendKind::Stub => Arc::new(StubAgentBackend::new()),
    };
    tracing::debug!(kind = ?config.kind, base_url = %config.base_url, "created agent backend");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_text() {
        let err = validate_send_request(&SendMessageRequest::new("s-1", "   \n")).unwrap_err();
        assert_eq!(err.kind(), AgentErrorKind::Validation);
    }

    #[test]
    fn validate_rejects_blank_session() {
        let err = validate_send_request(&SendMessageRequest::new("", "hello")).unwrap_err();
        assert!(err.to_string().contains("session id"));
    }

    #[test]
    fn validate_accepts_normal_request() {
        assert!(validate_send_request(&SendMessageRequest::new("s-1", "hello")).is_ok());
    }

    #[test]
    fn backend_config_defaults_from_empty_yaml_object() {
        let parsed: BackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, BackendConfig::default());
        assert_eq!(parsed.kind, BackendKind::Http);
        assert_eq!(parsed.base_url, DEFAULT_BASE_URL);
        assert_eq!(parsed.timeout_secs, 30);
    }

    #[test]
    fn backend_config_serialize_deserialize() {
        let config = BackendConfig::http("https://agent.example.com").with_api_token("tok");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(json.contains("\"kind\":\"http\""));
    }

    #[tokio::test]
    async fn create_backend_stub_is_offline() {
        let backend = create_backend(&BackendConfig::stub());
        let session = backend.create_session(None).await.unwrap();
        assert!(session.session_id.starts_with("stub-session-"));
        assert!(backend.health().await.is_ok());
    }
}
