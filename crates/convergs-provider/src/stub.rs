//! Offline backend used by the terminal playground and tests.
//!
//! Replies follow a fixed sales script and pick up qualification hints from
//! keywords in the user's text.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use convergs_schema::{CreateSessionResponse, SendMessageRequest, SendMessageResponse};
use tokio::sync::Mutex;

use crate::{validate_send_request, AgentBackend, AgentError};

const SCRIPT: &[&str] = &[
    "Thanks for sharing that. What kind of business are you running?",
    "Got it. What's the main goal you want an AI agent to help with?",
    "Makes sense. How soon are you looking to have something live?",
    "And have you set aside budget for this yet?",
    "Perfect, that gives me what I need. Want me to book a quick demo with our team?",
];

const HINTS: &[(&str, &[(&str, &str)])] = &[
    (
        "business_type",
        &[
            ("enterprise", "enterprise"),
            ("agency", "agency"),
            ("startup", "startup"),
            ("saas", "saas"),
            ("agents", "enterprise"),
            ("ecommerce", "ecommerce"),
        ],
    ),
    (
        "goal",
        &[
            ("lead", "lead qualification"),
            ("support", "customer support"),
            ("outbound", "outbound sales"),
            ("book", "meeting booking"),
        ],
    ),
    (
        "urgency",
        &[
            ("asap", "immediate"),
            ("this week", "immediate"),
            ("this month", "this month"),
            ("quarter", "this quarter"),
            ("next year", "long term"),
        ],
    ),
    (
        "budget_readiness",
        &[
            ("budget", "budget allocated"),
            ("approved", "budget approved"),
            ("no budget", "no budget yet"),
        ],
    ),
];

#[derive(Debug, Default)]
struct StubState {
    sessions: HashSet<String>,
    turns: BTreeMap<String, usize>,
    extracted: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct StubAgentBackend {
    next_id: AtomicUsize,
    latency: Option<Duration>,
    state: Mutex<StubState>,
}

impl StubAgentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to make the thinking phase visible.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Qualification hints found in `text`, first match per key.
pub fn extract_hints(text: &str) -> BTreeMap<String, String> {
    let lowered = text.to_lowercase();
    let mut found = BTreeMap::new();
    for (key, patterns) in HINTS {
        // Longer phrases first so "no budget" wins over "budget".
        let mut sorted: Vec<_> = patterns.iter().collect();
        sorted.sort_by_key(|(needle, _)| std::cmp::Reverse(needle.len()));
        if let Some((_, value)) = sorted.iter().find(|(needle, _)| lowered.contains(needle)) {
            found.insert((*key).to_string(), (*value).to_string());
        }
    }
    found
}

#[async_trait]
impl AgentBackend for StubAgentBackend {
    async fn create_session(
        &self,
        initial_prompt: Option<&str>,
    ) -> Result<CreateSessionResponse, AgentError> {
        self.pause().await;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("stub-session-{n}");
        self.state.lock().await.sessions.insert(session_id.clone());
        tracing::debug!(%session_id, persona = initial_prompt.is_some(), "stub session created");
        Ok(CreateSessionResponse { session_id })
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, AgentError> {
        validate_send_request(request)?;
        self.pause().await;

        let mut state = self.state.lock().await;
        if !state.sessions.contains(&request.session_id) {
            return Err(AgentError::Service {
                status: 404,
                message: format!("session not found: {}", request.session_id),
            });
        }

        let turn = state
            .turns
            .entry(request.session_id.clone())
            .or_insert(0);
        let reply = SCRIPT[(*turn).min(SCRIPT.len() - 1)];
        *turn += 1;

        let extracted = state
            .extracted
            .entry(request.session_id.clone())
            .or_default();
        let hints = extract_hints(&request.text);
        extracted.extend(hints.clone());
        let complete = HINTS.iter().all(|(key, _)| extracted.contains_key(*key));

        let mut response = SendMessageResponse::reply(reply).with_complete(complete);
        if !hints.is_empty() {
            response = response.with_qualification(hints);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_get_sequential_ids() {
        let backend = StubAgentBackend::new();
        let a = backend.create_session(None).await.unwrap();
        let b = backend.create_session(Some("be nice")).await.unwrap();
        assert_eq!(a.session_id, "stub-session-1");
        assert_eq!(b.session_id, "stub-session-2");
    }

    #[tokio::test]
    async fn unknown_session_is_a_service_error() {
        let backend = StubAgentBackend::new();
        let err = backend
            .send_message(&SendMessageRequest::new("missing", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Service { status: 404, .. }));
    }

    #[tokio::test]
    async fn replies_follow_script_and_extract_hints() {
        let backend = StubAgentBackend::new();
        let session = backend.create_session(None).await.unwrap().session_id;

        let first = backend
            .send_message(&SendMessageRequest::new(&session, "We need 50 agents"))
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.response, SCRIPT[0]);
        assert_eq!(
            first.qualification.unwrap().get("business_type").map(String::as_str),
            Some("enterprise")
        );
        assert_eq!(first.qualification_complete, Some(false));

        let second = backend
            .send_message(&SendMessageRequest::new(&session, "hello again"))
            .await
            .unwrap();
        assert_eq!(second.response, SCRIPT[1]);
        assert!(second.qualification.is_none());
    }

    #[tokio::test]
    async fn qualification_completes_when_all_keys_seen() {
        let backend = StubAgentBackend::new();
        let session = backend.create_session(None).await.unwrap().session_id;
        backend
            .send_message(&SendMessageRequest::new(&session, "we are a startup doing outbound"))
            .await
            .unwrap();
        let last = backend
            .send_message(&SendMessageRequest::new(
                &session,
                "need it asap and the budget is approved",
            ))
            .await
            .unwrap();
        assert_eq!(last.qualification_complete, Some(true));
    }

    #[test]
    fn longer_phrase_wins() {
        let hints = extract_hints("there is no budget right now");
        assert_eq!(hints.get("budget_readiness").map(String::as_str), Some("no budget yet"));
    }
}
