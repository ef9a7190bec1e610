//! Turn-taking between the user and a scripted character.
//!
//! The controller never sleeps. Scheduling a reply returns a [`PendingReply`]
//! handle; the caller waits out `delay()` however it likes and then hands the
//! handle back to [`DialogueController::deliver`]. Each handle carries the
//! session generation it was issued under, so a reply scheduled before a
//! story or character switch is dropped instead of leaking into the new
//! conversation.
use std::sync::Arc;
use std::time::Duration;

use crate::config::DialogueConfig;
use crate::content::ContentLibrary;
use crate::persistence::PersistedProgress;
use crate::resolver::{Resolution, StageResolver};
use crate::session::{Clock, Message, SessionState, SystemClock};
use crate::stage::{ProgressBand, StageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingCharacterReply,
}

/// Something the user did in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Free text typed into the input box.
    Text(String),
    /// One of the options offered by a character message.
    Choice { message_id: String, option: String },
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn choice(message_id: impl Into<String>, option: impl Into<String>) -> Self {
        Self::Choice {
            message_id: message_id.into(),
            option: option.into(),
        }
    }
}

/// Handle for a character reply that is still "typing".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    generation: u64,
    ticket: u64,
    stage: StageId,
    delay: Duration,
}

impl PendingReply {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stage the reply will move the conversation to.
    #[must_use]
    pub const fn stage(&self) -> StageId {
        self.stage
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Result of [`DialogueController::submit_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Nothing happened: blank text, invalid choice, no session, or a reply is still pending.
    Ignored,
    /// The user message was logged and a reply is scheduled.
    Reply(PendingReply),
    /// The user message was logged and asks to leave this story.
    SwitchStory,
}

/// Orchestrates one conversation at a time over shared content.
#[derive(Debug)]
pub struct DialogueController<C = SystemClock> {
    content: Arc<ContentLibrary>,
    resolver: StageResolver,
    config: DialogueConfig,
    clock: C,
    session: Option<SessionState>,
    generation: u64,
    next_ticket: u64,
    pending: Option<PendingReply>,
}

impl DialogueController<SystemClock> {
    #[must_use]
    pub fn new(content: Arc<ContentLibrary>, config: DialogueConfig) -> Self {
        Self::with_clock(content, config, SystemClock)
    }
}

impl<C> DialogueController<C>
where
    C: Clock,
{
    #[must_use]
    pub const fn with_clock(content: Arc<ContentLibrary>, config: DialogueConfig, clock: C) -> Self {
        Self {
            content,
            resolver: StageResolver::new(),
            config,
            clock,
            session: None,
            generation: 0,
            next_ticket: 0,
            pending: None,
        }
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
    pub const fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        if self.pending.is_some() {
            TurnPhase::AwaitingCharacterReply
        } else {
            TurnPhase::Idle
        }
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&PendingReply> {
        self.pending.as_ref()
    }

    /// Display band for the active session's progress.
    #[must_use]
    pub fn progress_band(&self) -> Option<ProgressBand> {
        self.session.as_ref().map(SessionState::progress_band)
    }

    /// Replace the active conversation and schedule the greeting.
    pub fn start_session(&mut self, story_id: &str, character_id: &str) -> PendingReply {
        if !self.content.has_script(story_id, character_id) {
            log::debug!("No script for {story_id}/{character_id}; using the generic table");
        }
        self.begin_generation(SessionState::new(story_id, character_id));
        self.schedule(StageId::Greeting, self.config.greeting_delay())
    }

    /// Talk to another character of the current story. Starts a fresh session.
    pub fn switch_character(&mut self, character_id: &str) -> Option<PendingReply> {
        let story_id = self.session.as_ref()?.story_id.clone();
        Some(self.start_session(&story_id, character_id))
    }

    /// Continue a saved conversation. No reply is scheduled.
    pub fn resume(&mut self, saved: &PersistedProgress) {
        self.begin_generation(saved.to_session());
    }

    /// Drop the outstanding reply, if any.
    pub fn cancel_pending(&mut self) -> Option<PendingReply> {
        self.pending.take()
    }

    /// Log the user's input and schedule the character's answer.
    pub fn submit_input(&mut self, input: UserInput) -> Submission {
        if self.pending.is_some() {
            log::debug!("Ignoring input while a reply is pending");
            return Submission::Ignored;
        }
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Submission::Ignored;
        };

        let text = match input {
            UserInput::Text(text) => {
                if text.trim().is_empty() {
                    return Submission::Ignored;
                }
                text
            }
            UserInput::Choice { message_id, option } => {
                if !session.select_option(&message_id, &option) {
                    log::debug!("Ignoring choice {option:?} for message {message_id}");
                    return Submission::Ignored;
                }
                option
            }
        };

        session.push_user_message(&text, now);
        match self.resolver.resolve(session.stage(), &text) {
            Resolution::Advance(stage) => {
                Submission::Reply(self.schedule(stage, self.config.typing_delay()))
            }
            Resolution::SwitchStory => Submission::SwitchStory,
        }
    }

    /// Apply a reply once its delay has elapsed. Stale or unknown handles are
    /// dropped and `None` is returned.
    pub fn deliver(&mut self, reply: &PendingReply) -> Option<&Message> {
        if self.pending.as_ref() != Some(reply) {
            log::debug!(
                "Dropping stale reply (generation {}, current {})",
                reply.generation,
                self.generation
            );
            return None;
        }
        self.pending = None;

        let now = self.clock.now();
        let session = self.session.as_mut()?;
        let entry = self
            .content
            .response_for(&session.story_id, &session.character_id, reply.stage);
        let speaker = self.content.character(&session.story_id, &session.character_id);
        Some(session.apply_reply(reply.stage, entry, speaker, now))
    }

    /// Snapshot of the active session for persistence.
    #[must_use]
    pub fn snapshot(&self, is_bookmarked: bool) -> Option<PersistedProgress> {
        let session = self.session.as_ref()?;
        Some(PersistedProgress::from_session(
            session,
            is_bookmarked,
            self.clock.now(),
        ))
    }

    fn begin_generation(&mut self, session: SessionState) {
        self.generation += 1;
        self.pending = None;
        self.session = Some(session);
    }

    fn schedule(&mut self, stage: StageId, delay: Duration) -> PendingReply {
        self.next_ticket += 1;
        let reply = PendingReply {
            generation: self.generation,
            ticket: self.next_ticket,
            stage,
            delay,
        };
        self.pending = Some(reply.clone());
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FixedClock;
    use chrono::{TimeZone, Utc};

    fn controller() -> DialogueController<FixedClock> {
        let content = Arc::new(ContentLibrary::builtin().unwrap());
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 4, 4, 12, 0, 0).unwrap());
        DialogueController::with_clock(content, DialogueConfig::default(), clock)
    }

    fn started(story: &str, character: &str) -> DialogueController<FixedClock> {
        let mut controller = controller();
        let greeting = controller.start_session(story, character);
        assert!(controller.deliver(&greeting).is_some());
        controller
    }

    fn reply(submission: Submission) -> PendingReply {
        match submission {
            Submission::Reply(pending) => pending,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn greeting_is_scheduled_with_greeting_delay() {
        let mut controller = controller();
        let greeting = controller.start_session("1984", "winston");
        assert_eq!(greeting.stage(), StageId::Greeting);
        assert_eq!(greeting.delay(), Duration::from_millis(1000));
        assert_eq!(controller.phase(), TurnPhase::AwaitingCharacterReply);

        let message = controller.deliver(&greeting).unwrap();
        assert!(!message.is_user);
        assert_eq!(message.character_name.as_deref(), Some("윈스턴 스미스"));
        assert_eq!(message.character_avatar.as_deref(), Some("W"));
        assert_eq!(message.stage, Some(StageId::Greeting));
        assert_eq!(controller.phase(), TurnPhase::Idle);
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut controller = started("1984", "winston");
        assert_eq!(controller.submit_input(UserInput::text("   ")), Submission::Ignored);
        assert_eq!(controller.session().unwrap().messages().len(), 1);
    }

    #[test]
    fn input_without_session_is_ignored() {
        let mut controller = controller();
        assert_eq!(controller.submit_input(UserInput::text("hello")), Submission::Ignored);
    }

    #[test]
    fn input_during_pending_reply_is_ignored() {
        let mut controller = controller();
        let _greeting = controller.start_session("1984", "winston");
        assert_eq!(
            controller.submit_input(UserInput::text("이야기를 시작해줘")),
            Submission::Ignored
        );
        assert!(controller.session().unwrap().messages().is_empty());
    }

    #[test]
    fn user_message_is_logged_before_reply() {
        let mut controller = started("1984", "winston");
        let pending = reply(controller.submit_input(UserInput::text("이야기를 시작해줘")));
        assert_eq!(pending.delay(), Duration::from_millis(1500));
        let session = controller.session().unwrap();
        assert_eq!(session.messages().len(), 2);
        assert!(session.last_message().unwrap().is_user);
        assert_eq!(session.stage(), StageId::Greeting);

        controller.deliver(&pending).unwrap();
        let session = controller.session().unwrap();
        assert_eq!(session.stage(), StageId::StoryStart);
        assert_eq!(session.progress(), 20);
        assert_eq!(session.messages().len(), 3);
    }

    #[test]
    fn choosing_an_option_marks_the_message() {
        let mut controller = started("1984", "winston");
        let greeting_id = controller.session().unwrap().messages()[0].id.clone();
        let pending = reply(
            controller.submit_input(UserInput::choice(greeting_id.clone(), "당신은 누구인가요?")),
        );
        assert_eq!(pending.stage(), StageId::Introduction);

        let greeting = controller.session().unwrap().message(&greeting_id).unwrap();
        assert_eq!(greeting.selected_option.as_deref(), Some("당신은 누구인가요?"));
        assert!(greeting.pending_options().is_empty());
    }

    #[test]
    fn answering_twice_or_with_unknown_option_is_ignored() {
        let mut controller = started("1984", "winston");
        let greeting_id = controller.session().unwrap().messages()[0].id.clone();
        assert_eq!(
            controller.submit_input(UserInput::choice(greeting_id.clone(), "없는 선택지")),
            Submission::Ignored
        );
        let pending = reply(controller.submit_input(UserInput::choice(
            greeting_id.clone(),
            "이야기를 처음부터 들려주세요",
        )));
        controller.deliver(&pending).unwrap();
        assert_eq!(
            controller.submit_input(UserInput::choice(greeting_id, "당신은 누구인가요?")),
            Submission::Ignored
        );
    }

    #[test]
    fn stale_reply_is_dropped_after_switch() {
        let mut controller = started("1984", "winston");
        let stale = reply(controller.submit_input(UserInput::text("이야기를 시작해줘")));
        let greeting = controller.start_session("parasite", "kitaek");
        assert!(controller.deliver(&stale).is_none());

        let session = controller.session().unwrap();
        assert_eq!(session.story_id, "parasite");
        assert!(session.messages().is_empty());
        assert_eq!(session.progress(), 0);

        controller.deliver(&greeting).unwrap();
        assert_eq!(controller.session().unwrap().messages().len(), 1);
    }

    #[test]
    fn reply_cannot_be_delivered_twice() {
        let mut controller = started("1984", "winston");
        let pending = reply(controller.submit_input(UserInput::text("당신은 누구인가요?")));
        assert!(controller.deliver(&pending).is_some());
        assert!(controller.deliver(&pending).is_none());
        assert_eq!(controller.session().unwrap().messages().len(), 3);
    }

    #[test]
    fn cancelled_reply_is_not_delivered() {
        let mut controller = started("1984", "winston");
        let pending = reply(controller.submit_input(UserInput::text("당신은 누구인가요?")));
        assert_eq!(controller.cancel_pending(), Some(pending.clone()));
        assert!(controller.deliver(&pending).is_none());
        assert_eq!(controller.phase(), TurnPhase::Idle);
    }

    #[test]
    fn switch_request_schedules_nothing() {
        let mut controller = started("1984", "winston");
        assert_eq!(
            controller.submit_input(UserInput::text("다른 이야기로 바꿀래요")),
            Submission::SwitchStory
        );
        assert_eq!(controller.phase(), TurnPhase::Idle);
        assert_eq!(controller.session().unwrap().messages().len(), 2);
    }

    #[test]
    fn switch_character_keeps_story() {
        let mut controller = started("1984", "winston");
        let generation = controller.generation();
        let greeting = controller.switch_character("julia").unwrap();
        assert!(controller.generation() > generation);
        let message = controller.deliver(&greeting).unwrap();
        assert_eq!(message.character_name.as_deref(), Some("줄리아"));
        assert_eq!(controller.session().unwrap().character_id, "julia");
    }

    #[test]
    fn unknown_pair_uses_generic_script() {
        let mut controller = started("no-such-story", "nobody");
        let message = controller.session().unwrap().last_message().unwrap();
        assert!(message.character_name.is_none());
        let pending = reply(controller.submit_input(UserInput::text("무엇이든")));
        let text = controller.deliver(&pending).unwrap().text.clone();
        assert_eq!(
            text,
            controller
                .content()
                .table_for("no-such-story", "nobody")
                .default_entry()
                .text
        );
    }

    #[test]
    fn resume_restores_saved_state() {
        let mut controller = started("1984", "winston");
        let pending = reply(controller.submit_input(UserInput::text("이야기를 시작해줘")));
        controller.deliver(&pending).unwrap();
        let saved = controller.snapshot(true).unwrap();
        assert!(saved.is_bookmarked);

        let mut other = self::controller();
        other.resume(&saved);
        let session = other.session().unwrap();
        assert_eq!(session.stage(), StageId::StoryStart);
        assert_eq!(session.progress(), 20);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(other.phase(), TurnPhase::Idle);
        assert_eq!(other.progress_band(), Some(ProgressBand::Opening));
    }
}
