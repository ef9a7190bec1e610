//! Canonical dialogue stages and the display bands derived from progress.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named point in a character's scripted dialogue arc.
///
/// Variants are declared in canonical progression order, so the derived
/// `Ord` matches the order in which a conversation moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageId {
    Greeting,
    Introduction,
    StoryStart,
    MeetingJulia,
    SecretRoom,
    ObrienTrap,
    MinistryOfLove,
    Room101,
    Ending,
}

impl StageId {
    /// Every stage in canonical progression order.
    pub const PROGRESSION: [Self; 9] = [
        Self::Greeting,
        Self::Introduction,
        Self::StoryStart,
        Self::MeetingJulia,
        Self::SecretRoom,
        Self::ObrienTrap,
        Self::MinistryOfLove,
        Self::Room101,
        Self::Ending,
    ];

    /// Stages reachable from `self`. The first entry is the fallback when no
    /// keyword group matches.
    #[must_use]
    pub const fn allowed_next(self) -> &'static [Self] {
        match self {
            Self::Greeting => &[Self::Introduction, Self::StoryStart],
            Self::Introduction => &[Self::StoryStart, Self::MeetingJulia],
            Self::StoryStart => &[Self::MeetingJulia, Self::SecretRoom],
            Self::MeetingJulia => &[Self::SecretRoom, Self::ObrienTrap],
            Self::SecretRoom => &[Self::ObrienTrap, Self::MinistryOfLove],
            Self::ObrienTrap => &[Self::MinistryOfLove, Self::Room101],
            Self::MinistryOfLove => &[Self::Room101, Self::Ending],
            Self::Room101 | Self::Ending => &[Self::Ending],
        }
    }

    /// The designated next stage (first allowed candidate).
    #[must_use]
    pub const fn designated_next(self) -> Self {
        self.allowed_next()[0]
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ending)
    }

    /// Identifier used in content files and persisted records.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Introduction => "introduction",
            Self::StoryStart => "storyStart",
            Self::MeetingJulia => "meetingJulia",
            Self::SecretRoom => "secretRoom",
            Self::ObrienTrap => "obrienTrap",
            Self::MinistryOfLove => "ministryOfLove",
            Self::Room101 => "room101",
            Self::Ending => "ending",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error returned when a string does not name a known stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PROGRESSION
            .into_iter()
            .find(|stage| stage.key() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Human-readable band derived from a 0..=100 progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBand {
    /// Exactly 0.
    NotStarted,
    /// 1 through 25.
    Opening,
    /// 26 through 50.
    Rising,
    /// 51 through 75.
    Crisis,
    /// 76 through 99.
    Climax,
    /// Exactly 100.
    Finale,
}

impl ProgressBand {
    #[must_use]
    pub const fn from_progress(progress: u8) -> Self {
        match progress {
            0 => Self::NotStarted,
            1..=25 => Self::Opening,
            26..=50 => Self::Rising,
            51..=75 => Self::Crisis,
            76..=99 => Self::Climax,
            _ => Self::Finale,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "대화 시작",
            Self::Opening => "도입부",
            Self::Rising => "전개",
            Self::Crisis => "위기",
            Self::Climax => "절정",
            Self::Finale => "결말",
        }
    }
}

impl fmt::Display for ProgressBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
