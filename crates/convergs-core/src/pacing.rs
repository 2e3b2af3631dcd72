use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_CHAR_MS: u64 = 50;
pub const DEFAULT_MIN_SPEAKING_MS: u64 = 2000;
pub const DEFAULT_MAX_SPEAKING_MS: u64 = 5000;

/// Stand-in for audio playback time: how long the agent "speaks" a reply of
/// a given length before it listens again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakingPacing {
    #[serde(default = "default_per_char_ms")]
    pub per_char_ms: u64,
    #[serde(default = "default_min_ms")]
    pub min_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_per_char_ms() -> u64 {
    DEFAULT_PER_CHAR_MS
}

fn default_min_ms() -> u64 {
    DEFAULT_MIN_SPEAKING_MS
}

fn default_max_ms() -> u64 {
    DEFAULT_MAX_SPEAKING_MS
}

impl Default for SpeakingPacing {
    fn default() -> Self {
        Self {
            per_char_ms: DEFAULT_PER_CHAR_MS,
            min_ms: DEFAULT_MIN_SPEAKING_MS,
            max_ms: DEFAULT_MAX_SPEAKING_MS,
        }
    }
}

impl SpeakingPacing {
    /// `clamp(len * per_char_ms, min_ms, max_ms)`. The lower bound is applied
    /// first so a misconfigured `min_ms > max_ms` yields `max_ms`.
    pub fn delay_for_len(&self, len: usize) -> Duration {
        let raw = (len as u64).saturating_mul(self.per_char_ms);
        Duration::from_millis(raw.max(self.min_ms).min(self.max_ms))
    }

    /// Length is counted in UTF-16 code units, the unit the web client
    /// measured reply length in. An emoji counts as two.
    pub fn delay_for(&self, text: &str) -> Duration {
        self.delay_for_len(text.encode_utf16().count())
    }
}

/// Speaking delay with the default pacing (50ms per character, 2s to 5s).
pub fn speaking_delay(response_len: usize) -> Duration {
    SpeakingPacing::default().delay_for_len(response_len)
}
