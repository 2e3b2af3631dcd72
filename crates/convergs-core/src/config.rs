use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use convergs_provider::BackendConfig;
use serde::{Deserialize, Serialize};

use crate::pacing::SpeakingPacing;
use crate::qualification::default_qualification_keys;

pub const DEFAULT_GREETING: &str = "Hi! I'm Emma from ConvergsAI. I noticed you were checking out our enterprise plan. Do you have a minute to chat about your sales goals?";
pub const DEFAULT_RING_MS: u64 = 2500;
pub const DEFAULT_GREETING_MS: u64 = 3000;
pub const DEFAULT_HANGUP_MS: u64 = 2000;
pub const BACKEND_URL_ENV: &str = "CONVERGS_BACKEND_URL";

/// Simulated timings and the scripted greeting of a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallConfig {
    #[serde(default = "default_ring_ms")]
    pub ring_ms: u64,
    /// How long the greeting is "spoken" before the agent listens.
    #[serde(default = "default_greeting_ms")]
    pub greeting_ms: u64,
    #[serde(default = "default_hangup_ms")]
    pub hangup_ms: u64,
    #[serde(default)]
    pub speaking: SpeakingPacing,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_ring_ms() -> u64 {
    DEFAULT_RING_MS
}

fn default_greeting_ms() -> u64 {
    DEFAULT_GREETING_MS
}

fn default_hangup_ms() -> u64 {
    DEFAULT_HANGUP_MS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_ms: DEFAULT_RING_MS,
            greeting_ms: DEFAULT_GREETING_MS,
            hangup_ms: DEFAULT_HANGUP_MS,
            speaking: SpeakingPacing::default(),
            greeting: default_greeting(),
        }
    }
}

impl CallConfig {
    pub fn ring_delay(&self) -> Duration {
        Duration::from_millis(self.ring_ms)
    }

    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_ms)
    }

    pub fn hangup_delay(&self) -> Duration {
        Duration::from_millis(self.hangup_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaygroundConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub call: CallConfig,
    /// Attributes the backend is expected to extract. Must match the
    /// backend's schema.
    #[serde(default = "default_qualification_keys")]
    pub qualification_keys: Vec<String>,
    /// Persona preset id used when the playground opens.
    #[serde(default = "default_preset_id")]
    pub default_preset: String,
}

fn default_preset_id() -> String {
    convergs_schema::default_preset().id.to_string()
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            call: CallConfig::default(),
            qualification_keys: default_qualification_keys(),
            default_preset: default_preset_id(),
        }
    }
}

impl PlaygroundConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            bail!("backend.base_url must not be empty");
        }
        if self.call.speaking.min_ms > self.call.speaking.max_ms {
            bail!(
                "call.speaking.min_ms ({}) exceeds max_ms ({})",
                self.call.speaking.min_ms,
                self.call.speaking.max_ms
            );
        }
        if self.call.greeting.trim().is_empty() {
            bail!("call.greeting must not be empty");
        }
        if self.qualification_keys.is_empty() {
            bail!("qualification_keys must list at least one key");
        }
        if convergs_schema::find_preset(&self.default_preset).is_none() {
            bail!("unknown default_preset: {}", self.default_preset);
        }
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(%url, "backend url overridden from environment");
            self.backend.base_url = url;
        }
    }
}

/// Load the playground config from a YAML file. A missing file yields the
/// defaults; environment overrides are applied before validation.
pub fn load_config(path: &Path) -> Result<PlaygroundConfig> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if content.trim().is_empty() {
            PlaygroundConfig::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        }
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        PlaygroundConfig::default()
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
