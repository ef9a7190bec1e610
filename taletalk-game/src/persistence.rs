//! Saved conversations, bookmarks and ratings on top of a key-value store.
//!
//! Records are kept as JSON lists under fixed keys. A blob that fails to
//! parse is treated as an empty list so a corrupt save never blocks play.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;

use crate::session::{Message, SessionState};
use crate::stage::StageId;

/// Storage key for the progress list.
pub const PROGRESS_KEY: &str = "storyProgress";
/// Storage key for the rating log.
pub const RATINGS_KEY: &str = "userRatings";

/// Trait for abstracting string blob storage.
/// Platform-specific implementations should provide this
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, replacing any previous blob
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// In-memory store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Storage error: {0}")]
    Storage(#[source] E),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Saved state of one (story, character) conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProgress {
    pub story_id: String,
    pub character_id: String,
    pub current_stage: StageId,
    pub progress: u8,
    pub messages: Vec<Message>,
    pub illustrations: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_bookmarked: bool,
}

impl PersistedProgress {
    #[must_use]
    pub fn from_session(session: &SessionState, is_bookmarked: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            story_id: session.story_id.clone(),
            character_id: session.character_id.clone(),
            current_stage: session.stage(),
            progress: session.progress(),
            messages: session.messages().to_vec(),
            illustrations: session.illustrations().to_vec(),
            timestamp,
            is_bookmarked,
        }
    }

    #[must_use]
    pub fn matches(&self, story_id: &str, character_id: &str) -> bool {
        self.story_id == story_id && self.character_id == character_id
    }

    /// Session rebuilt from this record.
    #[must_use]
    pub fn to_session(&self) -> SessionState {
        SessionState::restore(
            self.story_id.clone(),
            self.character_id.clone(),
            self.current_stage,
            self.progress,
            self.messages.clone(),
            self.illustrations.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    #[error("rating must be between 1 and 5, got {0}")]
    OutOfRange(u8),
}

/// One submitted star rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRating {
    pub story_id: String,
    pub rating: u8,
    #[serde(default)]
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
}

impl UserRating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a rating, rejecting values outside 1..=5.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::OutOfRange`] when no valid star count was chosen.
    pub fn new(
        story_id: impl Into<String>,
        rating: u8,
        feedback: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RatingError> {
        if !(Self::MIN..=Self::MAX).contains(&rating) {
            return Err(RatingError::OutOfRange(rating));
        }
        Ok(Self {
            story_id: story_id.into(),
            rating,
            feedback: feedback.into(),
            timestamp,
        })
    }

    #[must_use]
    pub const fn is_high(&self) -> bool {
        self.rating >= 4
    }
}

/// Progress, bookmark and rating operations over any [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct ProgressStore<S> {
    store: S,
}

type PersistResult<T, S> = Result<T, PersistError<<S as KeyValueStore>::Error>>;

impl<S> ProgressStore<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// All saved conversations in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn list_all(&self) -> PersistResult<Vec<PersistedProgress>, S> {
        self.read_list(PROGRESS_KEY)
    }

    /// Saved record for the pair, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn find(&self, story_id: &str, character_id: &str) -> PersistResult<Option<PersistedProgress>, S> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|p| p.matches(story_id, character_id)))
    }

    /// Insert or replace the record for its (story, character) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn save(&self, progress: &PersistedProgress) -> PersistResult<(), S> {
        let mut saves = self.list_all()?;
        if let Some(existing) = saves
            .iter_mut()
            .find(|p| p.matches(&progress.story_id, &progress.character_id))
        {
            *existing = progress.clone();
        } else {
            saves.push(progress.clone());
        }
        self.write_list(PROGRESS_KEY, &saves)
    }

    /// Save a live session, keeping whatever bookmark flag the pair already had.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn save_session(&self, session: &SessionState, timestamp: DateTime<Utc>) -> PersistResult<PersistedProgress, S> {
        let bookmarked = self
            .find(&session.story_id, &session.character_id)?
            .is_some_and(|p| p.is_bookmarked);
        let record = PersistedProgress::from_session(session, bookmarked, timestamp);
        self.save(&record)?;
        Ok(record)
    }

    /// Remove the record for the pair. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn delete_one(&self, story_id: &str, character_id: &str) -> PersistResult<bool, S> {
        let mut saves = self.list_all()?;
        let before = saves.len();
        saves.retain(|p| !p.matches(story_id, character_id));
        if saves.len() == before {
            return Ok(false);
        }
        self.write_list(PROGRESS_KEY, &saves)?;
        Ok(true)
    }

    /// Flip the bookmark flag. Returns the new flag, or `None` when nothing is saved for the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn toggle_bookmark(&self, story_id: &str, character_id: &str) -> PersistResult<Option<bool>, S> {
        let mut saves = self.list_all()?;
        let Some(record) = saves.iter_mut().find(|p| p.matches(story_id, character_id)) else {
            return Ok(None);
        };
        record.is_bookmarked = !record.is_bookmarked;
        let flag = record.is_bookmarked;
        self.write_list(PROGRESS_KEY, &saves)?;
        Ok(Some(flag))
    }

    /// Bookmarked records in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn bookmarked(&self) -> PersistResult<Vec<PersistedProgress>, S> {
        let mut saves = self.list_all()?;
        saves.retain(|p| p.is_bookmarked);
        Ok(saves)
    }

    /// Up to `limit` non-bookmarked records, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn recent(&self, limit: usize) -> PersistResult<Vec<PersistedProgress>, S> {
        let mut saves = self.list_all()?;
        saves.retain(|p| !p.is_bookmarked);
        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        saves.truncate(limit);
        Ok(saves)
    }

    /// Append a rating to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn save_rating(&self, rating: &UserRating) -> PersistResult<(), S> {
        let mut ratings = self.list_ratings()?;
        ratings.push(rating.clone());
        self.write_list(RATINGS_KEY, &ratings)
    }

    /// Every rating ever submitted, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn list_ratings(&self) -> PersistResult<Vec<UserRating>, S> {
        self.read_list(RATINGS_KEY)
    }

    fn read_list<T>(&self, key: &str) -> PersistResult<Vec<T>, S>
    where
        T: DeserializeOwned,
    {
        let Some(blob) = self.store.get(key).map_err(PersistError::Storage)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&blob) {
            Ok(list) => Ok(list),
            Err(e) => {
                log::warn!("Discarding unreadable `{key}` blob: {e}");
                Ok(Vec::new())
            }
        }
    }

    fn write_list<T>(&self, key: &str, list: &[T]) -> PersistResult<(), S>
    where
        T: Serialize,
    {
        let blob = serde_json::to_string(list)?;
        self.store.set(key, &blob).map_err(PersistError::Storage)
    }
}
