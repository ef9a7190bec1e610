//! Tunable timing and list sizes for the dialogue engine.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration. Every field has a default so partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Simulated typing time before a character reply is delivered.
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    /// Delay before the opening greeting of a new session.
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,
    /// Number of non-bookmarked saves listed as recent.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Number of stories returned by the recommender.
    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: usize,
}

const fn default_typing_delay_ms() -> u64 {
    1500
}

const fn default_greeting_delay_ms() -> u64 {
    1000
}

const fn default_recent_limit() -> usize {
    3
}

const fn default_recommendation_limit() -> usize {
    3
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay_ms(),
            greeting_delay_ms: default_greeting_delay_ms(),
            recent_limit: default_recent_limit(),
            recommendation_limit: default_recommendation_limit(),
        }
    }
}

impl DialogueConfig {
    /// Parse configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Configuration with no typing delays, for headless runs.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            typing_delay_ms: 0,
            greeting_delay_ms: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    #[must_use]
    pub const fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_delay_ms)
    }
}
