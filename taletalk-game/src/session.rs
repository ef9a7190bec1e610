//! Per-conversation state: message log, stage, progress and illustrations.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{Character, ResponseEntry};
use crate::stage::{ProgressBand, StageId};

/// Source of timestamps for messages and saved records.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. Useful for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
}

impl Message {
    /// Options still waiting for a choice. Empty once one has been selected.
    #[must_use]
    pub fn pending_options(&self) -> &[String] {
        if self.selected_option.is_some() {
            &[]
        } else {
            &self.options
        }
    }

    /// Text split into trimmed, non-empty paragraphs.
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.text.lines().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Mutable state of one (story, character) conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub story_id: String,
    pub character_id: String,
    stage: StageId,
    progress: u8,
    messages: Vec<Message>,
    illustrations: Vec<String>,
    #[serde(default)]
    next_message_seq: u64,
}

impl SessionState {
    /// Fresh session at the greeting stage with no history.
    #[must_use]
    pub fn new(story_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
            character_id: character_id.into(),
            stage: StageId::Greeting,
            progress: 0,
            messages: Vec::new(),
            illustrations: Vec::new(),
            next_message_seq: 0,
        }
    }

    /// Rebuild a session from saved parts. Duplicate illustrations are dropped
    /// and progress is clamped to 100.
    #[must_use]
    pub fn restore(
        story_id: impl Into<String>,
        character_id: impl Into<String>,
        stage: StageId,
        progress: u8,
        messages: Vec<Message>,
        illustrations: Vec<String>,
    ) -> Self {
        let next_message_seq = messages
            .iter()
            .filter_map(|m| m.id.strip_prefix("msg-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let mut session = Self {
            story_id: story_id.into(),
            character_id: character_id.into(),
            stage,
            progress: progress.min(100),
            messages,
            illustrations: Vec::new(),
            next_message_seq,
        };
        for url in illustrations {
            session.collect_illustration(&url);
        }
        session
    }

    #[must_use]
    pub const fn stage(&self) -> StageId {
        self.stage
    }

    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub const fn progress_band(&self) -> ProgressBand {
        ProgressBand::from_progress(self.progress)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn illustrations(&self) -> &[String] {
        &self.illustrations
    }

    #[must_use]
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn next_id(&mut self) -> String {
        self.next_message_seq += 1;
        format!("msg-{}", self.next_message_seq)
    }

    pub(crate) fn push_user_message(&mut self, text: &str, now: DateTime<Utc>) -> &Message {
        let id = self.next_id();
        self.messages.push(Message {
            id,
            text: text.to_string(),
            is_user: true,
            timestamp: now,
            image_url: None,
            options: Vec::new(),
            selected_option: None,
            progress: None,
            character_avatar: None,
            character_name: None,
            stage: None,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Apply a delivered character reply: move to `stage`, log the message,
    /// raise progress and collect the illustration.
    pub(crate) fn apply_reply(
        &mut self,
        stage: StageId,
        entry: &ResponseEntry,
        speaker: Option<&Character>,
        now: DateTime<Utc>,
    ) -> &Message {
        self.stage = stage;
        if let Some(progress) = entry.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(url) = entry.image_url.as_deref() {
            self.collect_illustration(url);
        }

        let id = self.next_id();
        self.messages.push(Message {
            id,
            text: entry.text.clone(),
            is_user: false,
            timestamp: now,
            image_url: entry.image_url.clone(),
            options: entry.options.clone(),
            selected_option: None,
            progress: entry.progress,
            character_avatar: speaker.map(|c| c.avatar.clone()),
            character_name: speaker.map(|c| c.name.clone()),
            stage: Some(stage),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Record `option` as the answer to an option-bearing character message.
    /// Returns `false` when the message is unknown, from the user, already
    /// answered, or does not offer that option.
    pub(crate) fn select_option(&mut self, message_id: &str, option: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if message.is_user
            || message.selected_option.is_some()
            || !message.options.iter().any(|o| o == option)
        {
            return false;
        }
        message.selected_option = Some(option.to_string());
        true
    }

    fn collect_illustration(&mut self, url: &str) -> bool {
        if self.illustrations.iter().any(|u| u == url) {
            return false;
        }
        self.illustrations.push(url.to_string());
        true
    }
}
