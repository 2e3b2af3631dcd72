use reqwest::StatusCode;

/// Coarse classification of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    /// Transport or connectivity failure.
    Network,
    /// Backend reachable but rejected or errored.
    Service,
    /// Request refused before it was sent.
    Validation,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent backend unreachable: {0}")]
    Network(String),
    #[error("agent backend error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("invalid agent request: {0}")]
    Validation(String),
}

impl AgentError {
    pub fn kind(&self) -> AgentErrorKind {
        match self {
            Self::Network(_) => AgentErrorKind::Network,
            Self::Service { .. } => AgentErrorKind::Service,
            Self::Validation(_) => AgentErrorKind::Validation,
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Network(format!("connect failed: {err}"))
        } else if err.is_decode() {
            Self::Network(format!("undecodable response body: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Build a service error from a non-2xx status and its raw body. The
    /// message is taken from a JSON `detail`, `error` or `message` field when
    /// the body has one.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| extract_message(&v))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    trimmed.to_string()
                }
            });
        Self::Service {
            status: status.as_u16(),
            message,
        }
    }
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
    for field in ["detail", "error", "message"] {
        match value.get(field) {
            Some(serde_json::Value::String(s)) => return Some(s.clone()),
            Some(nested @ serde_json::Value::Object(_)) => {
                if let Some(msg) = nested.get("message").and_then(|m| m.as_str()) {
                    return Some(msg.to_string());
                }
            }
            _ => {}
        }
    }
    None
}
