pub mod persona_presets;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use persona_presets::*;

/// Connectivity of the simulated phone call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    Connected,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Connected => "connected",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Conversational turn-taking phase of the agent. Only meaningful while
/// the call is connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ============================================================
// Backend wire contract
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    pub session_id: String,
}

impl SendMessageRequest {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    #[serde(default)]
    pub response: String,
    /// Extracted attributes. Entries the backend sends as `null` (not yet
    /// extracted) or as non-scalar values are dropped on the way in.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_fields"
    )]
    pub qualification: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification_complete: Option<bool>,
}

fn scalar_fields<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    let Some(Value::Object(raw)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let fields = raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            Value::Bool(b) => Some((key, b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        })
        .collect();
    Ok(Some(fields))
}

impl SendMessageResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            success: true,
            response: text.into(),
            qualification: None,
            qualification_complete: None,
        }
    }

    pub fn with_qualification<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = self.qualification.get_or_insert_with(BTreeMap::new);
        for (k, v) in fields {
            map.insert(k.into(), v.into());
        }
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.qualification_complete = Some(complete);
        self
    }
}

// ============================================================
// Qualification keys
// ============================================================

/// Lead attributes the demo backend extracts, with display labels.
pub const DEFAULT_QUALIFICATION_KEYS: &[(&str, &str)] = &[
    ("business_type", "Business Type"),
    ("goal", "Primary Goal"),
    ("urgency", "Timeline"),
    ("budget_readiness", "Budget Status"),
];

/// Display label for a qualification key. Unknown keys are title-cased.
pub fn qualification_label(key: &str) -> String {
    if let Some((_, label)) = DEFAULT_QUALIFICATION_KEYS.iter().find(|(k, _)| *k == key) {
        return (*label).to_string();
    }
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_state_serializes_snake_case() {
        let json = serde_json::to_string(&CallState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
        let parsed: AgentState = serde_json::from_str("\"thinking\"").unwrap();
        assert_eq!(parsed, AgentState::Thinking);
    }

    #[test]
    fn states_default_to_idle() {
        assert_eq!(CallState::default(), CallState::Idle);
        assert_eq!(AgentState::default(), AgentState::Idle);
        assert_eq!(CallState::Ringing.to_string(), "ringing");
        assert_eq!(AgentState::Speaking.to_string(), "speaking");
    }

    #[test]
    fn message_constructors_assign_unique_ids() {
        let a = Message::user("hello");
        let b = Message::assistant("hi there");
        assert_eq!(a.role, Role::User);
        assert_eq!(b.role, Role::Assistant);
        assert_ne!(a.id, b.id);
        assert!(a.timestamp <= b.timestamp);
    }

    #[test]
    fn create_session_request_omits_missing_prompt() {
        let value = serde_json::to_value(CreateSessionRequest::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));

        let value = serde_json::to_value(CreateSessionRequest {
            initial_prompt: Some("be brief".into()),
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"initial_prompt": "be brief"}));
    }

    #[test]
    fn send_message_response_tolerates_missing_optional_fields() {
        let raw = serde_json::json!({"success": true, "response": "ok", "stage": "greeting"});
        let parsed: SendMessageResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.response, "ok");
        assert!(parsed.qualification.is_none());
        assert!(parsed.qualification_complete.is_none());

        let failed: SendMessageResponse =
            serde_json::from_value(serde_json::json!({"success": false})).unwrap();
        assert!(!failed.success);
        assert!(failed.response.is_empty());
    }

    #[test]
    fn send_message_response_parses_qualification() {
        let raw = serde_json::json!({
            "success": true,
            "response": "Great, what's your timeline?",
            "qualification": {"business_type": "enterprise"},
            "qualification_complete": false
        });
        let parsed: SendMessageResponse = serde_json::from_value(raw).unwrap();
        let expected = SendMessageResponse::reply("Great, what's your timeline?")
            .with_qualification([("business_type", "enterprise")])
            .with_complete(false);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn null_qualification_entries_are_dropped() {
        let raw = serde_json::json!({
            "success": true,
            "response": "Great, what's your timeline?",
            "qualification": {"business_type": "enterprise", "urgency": null, "goal": ["a"]}
        });
        let parsed: SendMessageResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.response, "Great, what's your timeline?");
        let fields = parsed.qualification.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["business_type"], "enterprise");
    }

    #[test]
    fn scalar_qualification_values_become_strings() {
        let raw = serde_json::json!({
            "success": true,
            "qualification": {"team_size": 50, "budget_readiness": true}
        });
        let parsed: SendMessageResponse = serde_json::from_value(raw).unwrap();
        let fields = parsed.qualification.unwrap();
        assert_eq!(fields["team_size"], "50");
        assert_eq!(fields["budget_readiness"], "true");
    }

    #[test]
    fn null_or_malformed_qualification_is_absent() {
        for qualification in [serde_json::Value::Null, serde_json::json!("pending")] {
            let raw = serde_json::json!({"success": true, "qualification": qualification});
            let parsed: SendMessageResponse = serde_json::from_value(raw).unwrap();
            assert!(parsed.qualification.is_none());
        }
    }

    #[test]
    fn qualification_labels() {
        assert_eq!(qualification_label("urgency"), "Timeline");
        assert_eq!(qualification_label("budget_readiness"), "Budget Status");
        assert_eq!(qualification_label("decision_maker"), "Decision Maker");
    }
}
