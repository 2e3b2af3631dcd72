use std::time::Duration;

use async_trait::async_trait;
use convergs_schema::{
    CreateSessionRequest, CreateSessionResponse, SendMessageRequest, SendMessageResponse,
};
use serde::de::DeserializeOwned;

use crate::{validate_send_request, AgentBackend, AgentError, BackendConfig, DEFAULT_TIMEOUT_SECS};

pub const SESSION_PATH: &str = "/api/session";
pub const MESSAGE_PATH: &str = "/api/message";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub struct HttpAgentBackend {
    client: reqwest::Client,
    api_base: String,
    api_token: Option<String>,
}

impl HttpAgentBackend {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_timeout(api_base, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token: None,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let mut backend =
            Self::with_timeout(&config.base_url, Duration::from_secs(config.timeout_secs));
        backend.api_token = config.api_token.clone();
        backend
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.api_base, path));
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AgentError> {
        let resp = req.send().await.map_err(AgentError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status, &text));
        }

        resp.json::<T>().await.map_err(AgentError::from_transport)
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    async fn create_session(
        &self,
        initial_prompt: Option<&str>,
    ) -> Result<CreateSessionResponse, AgentError> {
        let payload = CreateSessionRequest {
            initial_prompt: initial_prompt.map(str::to_string),
        };
        let req = self
            .request(reqwest::Method::POST, SESSION_PATH)
            .json(&payload);
        let created: CreateSessionResponse = self.execute(req).await?;
        if created.session_id.trim().is_empty() {
            return Err(AgentError::Service {
                status: 200,
                message: "backend returned an empty session id".into(),
            });
        }
        tracing::debug!(session_id = %created.session_id, "agent session created");
        Ok(created)
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, AgentError> {
        validate_send_request(request)?;
        let req = self
            .request(reqwest::Method::POST, MESSAGE_PATH)
            .json(request);
        self.execute(req).await
    }

    async fn health(&self) -> Result<(), AgentError> {
        let req = self.request(reqwest::Method::GET, HEALTH_PATH);
        let resp = req.send().await.map_err(AgentError::from_transport)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(AgentError::from_status(status, &text))
        }
    }
}
