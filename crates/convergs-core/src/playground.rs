use std::sync::Arc;

use convergs_provider::AgentBackend;
use convergs_schema::{default_preset, find_preset, PersonaPreset, PERSONA_PRESETS};

use crate::config::PlaygroundConfig;
use crate::session::{CallSession, SessionOptions};

#[derive(Debug, thiserror::Error)]
pub enum PlaygroundError {
    #[error("unknown persona preset: {0}")]
    UnknownPreset(String),
}

/// Persona selection plus the one live [`CallSession`] it feeds.
///
/// A new prompt reaches the live instance as the persona for its next call.
/// [`Playground::restart`] throws the instance away and builds a fresh one,
/// cancelling whatever the old one still had pending.
pub struct Playground {
    backend: Arc<dyn AgentBackend>,
    config: PlaygroundConfig,
    prompt: String,
    preset: Option<&'static PersonaPreset>,
    generation: u64,
    session: CallSession,
}

impl Playground {
    pub fn new(backend: Arc<dyn AgentBackend>, config: PlaygroundConfig) -> Self {
        let preset = find_preset(&config.default_preset).unwrap_or_else(default_preset);
        let prompt = preset.prompt.to_string();
        let session = CallSession::new(
            backend.clone(),
            SessionOptions::from_config(&config, Some(prompt.clone())),
        );
        Self {
            backend,
            config,
            prompt,
            preset: Some(preset),
            generation: 0,
            session,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Number of restarts so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The selected preset, `None` once the prompt was edited by hand.
    pub fn active_preset(&self) -> Option<&'static PersonaPreset> {
        self.preset
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    pub fn select_preset(&mut self, key: &str) -> Result<&'static PersonaPreset, PlaygroundError> {
        let preset = find_preset(key).ok_or_else(|| PlaygroundError::UnknownPreset(key.to_string()))?;
        self.preset = Some(preset);
        self.update_prompt(preset.prompt.to_string());
        Ok(preset)
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.preset = PERSONA_PRESETS.iter().find(|p| p.prompt == prompt.trim());
        self.update_prompt(prompt);
    }

    /// Hard reset: discard the live instance and construct a fresh one.
    /// Returns the new generation.
    pub fn restart(&mut self) -> u64 {
        self.session.shutdown();
        self.generation += 1;
        self.session = CallSession::new(
            self.backend.clone(),
            SessionOptions::from_config(&self.config, Some(self.prompt.clone())),
        );
        tracing::info!(generation = self.generation, "playground session restarted");
        self.generation
    }

    fn update_prompt(&mut self, prompt: String) {
        self.session.set_persona_prompt(Some(prompt.clone()));
        self.prompt = prompt;
    }
}

impl Drop for Playground {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}
