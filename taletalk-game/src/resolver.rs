//! Keyword-driven stage transitions.
//!
//! Matching is a case-insensitive substring test. Groups are consulted in
//! canonical progression order and the first group with a hit wins, so the
//! tie-break is fully determined by [`KEYWORD_GROUPS`].
use crate::stage::StageId;

/// Phrases that ask to leave the current story instead of advancing it.
pub const SWITCH_STORY_KEYWORDS: &[&str] = &["다른 이야기", "다른 작품", "switch story"];

/// Phrases that jump straight to the ending from any stage.
pub const ENDING_KEYWORDS: &[&str] = &["결말", "끝", "ending"];

/// Ordered `(stage, keywords)` pairs consulted for non-terminal transitions.
pub const KEYWORD_GROUPS: &[(StageId, &[&str])] = &[
    (StageId::Introduction, &["소개", "누구", "자신"]),
    (StageId::StoryStart, &["이야기", "시작", "처음"]),
    (StageId::MeetingJulia, &["줄리아", "만남", "사랑", "julia"]),
    (StageId::SecretRoom, &["비밀", "다락", "은신처"]),
    (StageId::ObrienTrap, &["오브라이언", "형제단", "함정", "obrien"]),
    (StageId::MinistryOfLove, &["애정부", "체포", "고문"]),
    (StageId::Room101, &["101", "쥐", "배신"]),
];

/// Outcome of resolving one user input against the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Move the conversation to this stage.
    Advance(StageId),
    /// Leave the dialogue; the caller decides which story comes next.
    SwitchStory,
}

/// Pure stage transition function over the canonical progression.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageResolver;

impl StageResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Resolve free text or a chosen option into the next step.
    #[must_use]
    pub fn resolve(&self, current: StageId, input: &str) -> Resolution {
        let normalized = input.to_lowercase();
        if contains_any(&normalized, SWITCH_STORY_KEYWORDS) {
            return Resolution::SwitchStory;
        }
        if current.is_terminal() || contains_any(&normalized, ENDING_KEYWORDS) {
            return Resolution::Advance(StageId::Ending);
        }

        let candidates = current.allowed_next();
        let matched = KEYWORD_GROUPS
            .iter()
            .filter(|(stage, _)| candidates.contains(stage))
            .find(|(_, keywords)| contains_any(&normalized, keywords))
            .map(|(stage, _)| *stage);

        Resolution::Advance(matched.unwrap_or_else(|| current.designated_next()))
    }

    /// Stage-only view of [`Self::resolve`]; a switch request leaves the stage unchanged.
    #[must_use]
    pub fn next_stage(&self, current: StageId, input: &str) -> StageId {
        match self.resolve(current, input) {
            Resolution::Advance(stage) => stage,
            Resolution::SwitchStory => current,
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
