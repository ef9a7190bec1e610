//! Story catalogue and scripted response tables.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::stage::StageId;

const DEFAULT_KEY: &str = "default";

/// Errors raised while loading or validating content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown stage key: {0}")]
    UnknownStage(String),
    #[error("response table is missing its `default` entry")]
    MissingDefault,
    #[error("invalid response entry `{key}`: {reason}")]
    InvalidEntry { key: String, reason: &'static str },
    #[error("duplicate story id: {0}")]
    DuplicateStory(String),
    #[error("duplicate character id `{character}` in story `{story}`")]
    DuplicateCharacter { story: String, character: String },
    #[error("responses reference unknown character `{character}` in story `{story}`")]
    UnknownReference { story: String, character: String },
}

/// A character the user can talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub role: String,
}

/// A story and the characters it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub thumbnail: String,
    #[serde(default)]
    pub background_theme: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub characters: Vec<Character>,
}

impl Story {
    #[must_use]
    pub fn character(&self, character_id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == character_id)
    }
}

/// Canned reply content for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl ResponseEntry {
    fn validate(&self, key: &str) -> Result<(), ContentError> {
        let invalid = |reason| ContentError::InvalidEntry {
            key: key.to_string(),
            reason,
        };
        if self.text.trim().is_empty() {
            return Err(invalid("text is blank"));
        }
        if self.options.iter().any(|option| option.trim().is_empty()) {
            return Err(invalid("option is blank"));
        }
        if self.progress.is_some_and(|p| p > 100) {
            return Err(invalid("progress exceeds 100"));
        }
        if self.image_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(invalid("image url is blank"));
        }
        Ok(())
    }
}

/// Stage-keyed responses for one (story, character) pair, plus its fallback entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ResponseEntry>",
    into = "BTreeMap<String, ResponseEntry>"
)]
pub struct ResponseTable {
    entries: BTreeMap<StageId, ResponseEntry>,
    default: ResponseEntry,
}

impl ResponseTable {
    /// Build a table, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry is malformed.
    pub fn new(
        entries: BTreeMap<StageId, ResponseEntry>,
        default: ResponseEntry,
    ) -> Result<Self, ContentError> {
        default.validate(DEFAULT_KEY)?;
        for (stage, entry) in &entries {
            entry.validate(stage.key())?;
        }
        Ok(Self { entries, default })
    }

    /// Entry for `stage`, or the table's `default` entry.
    #[must_use]
    pub fn entry(&self, stage: StageId) -> &ResponseEntry {
        self.entries.get(&stage).unwrap_or(&self.default)
    }

    #[must_use]
    pub fn has_stage(&self, stage: StageId) -> bool {
        self.entries.contains_key(&stage)
    }

    #[must_use]
    pub const fn default_entry(&self) -> &ResponseEntry {
        &self.default
    }

    /// Scripted stages in progression order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.entries.keys().copied()
    }
}

impl TryFrom<BTreeMap<String, ResponseEntry>> for ResponseTable {
    type Error = ContentError;

    fn try_from(mut raw: BTreeMap<String, ResponseEntry>) -> Result<Self, Self::Error> {
        let default = raw.remove(DEFAULT_KEY).ok_or(ContentError::MissingDefault)?;
        let entries = raw
            .into_iter()
            .map(|(key, entry)| {
                key.parse::<StageId>()
                    .map(|stage| (stage, entry))
                    .map_err(|_| ContentError::UnknownStage(key))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Self::new(entries, default)
    }
}

impl From<ResponseTable> for BTreeMap<String, ResponseEntry> {
    fn from(table: ResponseTable) -> Self {
        let mut raw: Self = table
            .entries
            .into_iter()
            .map(|(stage, entry)| (stage.key().to_string(), entry))
            .collect();
        raw.insert(DEFAULT_KEY.to_string(), table.default);
        raw
    }
}

/// Serialized shape of `responses.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCatalog {
    #[serde(default)]
    pub stories: HashMap<String, HashMap<String, ResponseTable>>,
    pub default: ResponseTable,
}

/// Everything needed to run conversations: stories, characters and scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLibrary {
    stories: Vec<Story>,
    responses: HashMap<String, HashMap<String, ResponseTable>>,
    default_table: ResponseTable,
}

impl ContentLibrary {
    /// Assemble a library, checking ids and cross references.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate ids or scripts for characters that do not exist.
    pub fn new(stories: Vec<Story>, catalog: ResponseCatalog) -> Result<Self, ContentError> {
        let mut seen_stories = HashSet::new();
        for story in &stories {
            if !seen_stories.insert(story.id.as_str()) {
                return Err(ContentError::DuplicateStory(story.id.clone()));
            }
            let mut seen_characters = HashSet::new();
            for character in &story.characters {
                if !seen_characters.insert(character.id.as_str()) {
                    return Err(ContentError::DuplicateCharacter {
                        story: story.id.clone(),
                        character: character.id.clone(),
                    });
                }
            }
        }

        for (story_id, tables) in &catalog.stories {
            for character_id in tables.keys() {
                let known = stories
                    .iter()
                    .find(|s| &s.id == story_id)
                    .and_then(|s| s.character(character_id))
                    .is_some();
                if !known {
                    return Err(ContentError::UnknownReference {
                        story: story_id.clone(),
                        character: character_id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            stories,
            responses: catalog.stories,
            default_table: catalog.default,
        })
    }

    /// Load content from `stories.json` and `responses.json` strings.
    ///
    /// # Errors
    ///
    /// Returns an error if either document is malformed or fails validation.
    pub fn from_json(stories_json: &str, responses_json: &str) -> Result<Self, ContentError> {
        let stories: Vec<Story> = serde_json::from_str(stories_json)?;
        let catalog: ResponseCatalog = serde_json::from_str(responses_json)?;
        Self::new(stories, catalog)
    }

    /// Content shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded assets fail validation.
    pub fn builtin() -> Result<Self, ContentError> {
        Self::from_json(
            include_str!("../assets/data/stories.json"),
            include_str!("../assets/data/responses.json"),
        )
    }

    #[must_use]
    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    #[must_use]
    pub fn story(&self, story_id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == story_id)
    }

    #[must_use]
    pub fn character(&self, story_id: &str, character_id: &str) -> Option<&Character> {
        self.story(story_id)?.character(character_id)
    }

    /// Whether the pair has its own script rather than the generic one.
    #[must_use]
    pub fn has_script(&self, story_id: &str, character_id: &str) -> bool {
        self.responses
            .get(story_id)
            .is_some_and(|tables| tables.contains_key(character_id))
    }

    /// Script for the pair, or the story-agnostic default table.
    #[must_use]
    pub fn table_for(&self, story_id: &str, character_id: &str) -> &ResponseTable {
        self.responses
            .get(story_id)
            .and_then(|tables| tables.get(character_id))
            .unwrap_or(&self.default_table)
    }

    /// Response for a stage. Never fails: unknown pairs use the default table
    /// and unscripted stages use the table's `default` entry.
    #[must_use]
    pub fn response_for(&self, story_id: &str, character_id: &str, stage: StageId) -> &ResponseEntry {
        self.table_for(story_id, character_id).entry(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> ResponseEntry {
        ResponseEntry {
            text: text.to_string(),
            image_url: None,
            options: Vec::new(),
            progress: None,
        }
    }

    #[test]
    fn builtin_content_loads() {
        let library = ContentLibrary::builtin().unwrap();
        assert_eq!(library.stories().len(), 5);
        assert!(library.has_script("1984", "winston"));
        assert!(!library.has_script("avengers", "tony"));
        let winston = library.table_for("1984", "winston");
        for stage in StageId::PROGRESSION {
            assert!(winston.has_stage(stage), "winston missing {stage}");
        }
    }

    #[test]
    fn table_parses_stage_keys_and_default() {
        let json = r#"{
            "greeting": { "text": "hi", "options": ["a", "b"], "progress": 0 },
            "room101": { "text": "rats", "imageUrl": "https://example.com/r.jpg" },
            "default": { "text": "fallback" }
        }"#;
        let table: ResponseTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.entry(StageId::Greeting).options, vec!["a", "b"]);
        assert_eq!(
            table.entry(StageId::Room101).image_url.as_deref(),
            Some("https://example.com/r.jpg")
        );
        assert_eq!(table.entry(StageId::Ending).text, "fallback");
        let stages: Vec<_> = table.stages().collect();
        assert_eq!(stages, vec![StageId::Greeting, StageId::Room101]);
    }

    #[test]
    fn table_rejects_unknown_stage_and_missing_default() {
        let unknown = r#"{ "lesson": { "text": "x" }, "default": { "text": "d" } }"#;
        let err = serde_json::from_str::<ResponseTable>(unknown).unwrap_err();
        assert!(err.to_string().contains("unknown stage"));

        let missing = r#"{ "greeting": { "text": "x" } }"#;
        let err = serde_json::from_str::<ResponseTable>(missing).unwrap_err();
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn table_rejects_out_of_range_progress() {
        let mut entries = BTreeMap::new();
        let mut bad = entry("too far");
        bad.progress = Some(101);
        entries.insert(StageId::Ending, bad);
        let err = ResponseTable::new(entries, entry("d")).unwrap_err();
        assert!(matches!(err, ContentError::InvalidEntry { ref key, .. } if key == "ending"));
    }

    #[test]
    fn table_rejects_blank_options() {
        let mut blank = entry("text");
        blank.options = vec!["ok".to_string(), "  ".to_string()];
        let err = ResponseTable::new(BTreeMap::new(), blank).unwrap_err();
        assert!(matches!(err, ContentError::InvalidEntry { reason, .. } if reason == "option is blank"));
    }

    #[test]
    fn response_lookup_falls_back_twice() {
        let library = ContentLibrary::builtin().unwrap();
        let generic = library.response_for("no-such-story", "nobody", StageId::SecretRoom);
        assert_eq!(
            generic,
            library.table_for("no-such-story", "nobody").default_entry()
        );

        let julia = library.table_for("1984", "julia");
        assert!(!julia.has_stage(StageId::Introduction));
        assert_eq!(
            library.response_for("1984", "julia", StageId::Introduction),
            julia.default_entry()
        );
    }

    #[test]
    fn library_rejects_scripts_for_unknown_characters() {
        let stories = r#"[{
            "id": "s", "title": "S", "description": "d", "genre": "g", "thumbnail": "t",
            "characters": [{ "id": "c", "name": "C", "avatar": "C", "description": "d", "role": "r" }]
        }]"#;
        let responses = r#"{
            "stories": { "s": { "ghost": { "default": { "text": "boo" } } } },
            "default": { "default": { "text": "d" } }
        }"#;
        let err = ContentLibrary::from_json(stories, responses).unwrap_err();
        assert!(matches!(err, ContentError::UnknownReference { ref character, .. } if character == "ghost"));
    }

    #[test]
    fn library_rejects_duplicate_story_ids() {
        let stories = r#"[
            { "id": "s", "title": "S", "description": "d", "genre": "g", "thumbnail": "t", "characters": [] },
            { "id": "s", "title": "S2", "description": "d", "genre": "g", "thumbnail": "t", "characters": [] }
        ]"#;
        let responses = r#"{ "default": { "default": { "text": "d" } } }"#;
        let err = ContentLibrary::from_json(stories, responses).unwrap_err();
        assert!(matches!(err, ContentError::DuplicateStory(ref id) if id == "s"));
    }

    #[test]
    fn tables_serialize_back_to_string_keys() {
        let library = ContentLibrary::builtin().unwrap();
        let value = serde_json::to_value(library.table_for("1984", "julia")).unwrap();
        assert!(value.get("default").is_some());
        assert!(value.get("meetingJulia").is_some());
    }
}
