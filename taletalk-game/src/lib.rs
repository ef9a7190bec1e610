//! TaleTalk Dialogue Engine
//!
//! Platform-agnostic core logic for conversing with characters from well-known
//! stories. Content lookup, stage transitions, turn-taking, persistence and
//! recommendations live here; rendering and storage backends are left to the
//! embedding front end.

pub mod config;
pub mod content;
pub mod controller;
pub mod persistence;
pub mod recommend;
pub mod resolver;
pub mod session;
pub mod stage;
#[cfg(feature = "async")]
pub mod typing;

use std::sync::Arc;

pub use config::DialogueConfig;
pub use content::{
    Character, ContentError, ContentLibrary, ResponseCatalog, ResponseEntry, ResponseTable, Story,
};
pub use controller::{DialogueController, PendingReply, Submission, TurnPhase, UserInput};
pub use persistence::{
    KeyValueStore, MemoryStore, PersistError, PersistedProgress, ProgressStore, RatingError,
    UserRating,
};
pub use recommend::{Recommendation, recommend};
pub use resolver::{Resolution, StageResolver};
pub use session::{Clock, FixedClock, Message, SessionState, SystemClock};
pub use stage::{ProgressBand, StageId, UnknownStage};

/// Shared content, configuration and storage for any number of conversations.
pub struct StoryEngine<S>
where
    S: KeyValueStore,
{
    content: Arc<ContentLibrary>,
    config: DialogueConfig,
    store: ProgressStore<S>,
}

impl<S> StoryEngine<S>
where
    S: KeyValueStore,
{
    /// Create an engine over the given content, configuration and backing store
    pub fn new(content: impl Into<Arc<ContentLibrary>>, config: DialogueConfig, store: S) -> Self {
        Self {
            content: content.into(),
            config,
            store: ProgressStore::new(store),
        }
    }

    /// Engine over the built-in stories.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded content fails validation.
    pub fn builtin(config: DialogueConfig, store: S) -> Result<Self, ContentError> {
        Ok(Self::new(ContentLibrary::builtin()?, config, store))
    }

    #[must_use]
    pub fn content(&self) -> &ContentLibrary {
        &self.content
    }

    #[must_use]
    pub const fn config(&self) -> &DialogueConfig {
        &self.config
    }

    #[must_use]
    pub const fn progress_store(&self) -> &ProgressStore<S> {
        &self.store
    }

    /// New controller sharing this engine's content, driven by the system clock.
    #[must_use]
    pub fn controller(&self) -> DialogueController {
        DialogueController::new(Arc::clone(&self.content), self.config.clone())
    }

    /// New controller with a caller-supplied clock.
    #[must_use]
    pub fn controller_with_clock<C: Clock>(&self, clock: C) -> DialogueController<C> {
        DialogueController::with_clock(Arc::clone(&self.content), self.config.clone(), clock)
    }

    /// Persist the controller's active session, keeping any existing bookmark.
    /// Returns `None` when the controller has no session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn save<C: Clock>(
        &self,
        controller: &DialogueController<C>,
    ) -> Result<Option<PersistedProgress>, PersistError<S::Error>> {
        let Some(snapshot) = controller.snapshot(false) else {
            return Ok(None);
        };
        let session = snapshot.to_session();
        self.store.save_session(&session, snapshot.timestamp).map(Some)
    }

    /// Resume the saved conversation for `(story_id, character_id)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn resume_into<C: Clock>(
        &self,
        controller: &mut DialogueController<C>,
        story_id: &str,
        character_id: &str,
    ) -> Result<bool, PersistError<S::Error>> {
        match self.store.find(story_id, character_id)? {
            Some(saved) => {
                controller.resume(&saved);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Most recently saved non-bookmarked conversations.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn recent(&self) -> Result<Vec<PersistedProgress>, PersistError<S::Error>> {
        self.store.recent(self.config.recent_limit)
    }

    /// Story suggestions based on the stored ratings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn recommendations(&self) -> Result<Vec<Recommendation>, PersistError<S::Error>> {
        let ratings = self.store.list_ratings()?;
        Ok(recommend(
            self.content.stories(),
            &ratings,
            self.config.recommendation_limit,
        ))
    }
}
