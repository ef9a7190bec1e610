use anyhow::{Context, Result};
use std::sync::Arc;

use taletalk_game::{
    ContentLibrary, DialogueConfig, DialogueController, PendingReply, StageId, Submission,
    UserInput,
};

pub mod dialogue;
pub mod smoke;
pub mod storage;

/// Shared inputs for every scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub content: Arc<ContentLibrary>,
    pub config: DialogueConfig,
    pub verbose: bool,
}

impl ScenarioCtx {
    pub fn new(content: Arc<ContentLibrary>, config: DialogueConfig, verbose: bool) -> Self {
        Self {
            content,
            config,
            verbose,
        }
    }

    pub fn controller(&self) -> DialogueController {
        DialogueController::new(Arc::clone(&self.content), self.config.clone())
    }
}

pub type ScenarioCheck = fn(&ScenarioCtx) -> Result<()>;

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    check: ScenarioCheck,
}

impl TestScenario {
    #[must_use]
    pub fn new(name: impl Into<String>, check: ScenarioCheck) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    pub fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        (self.check)(ctx)
    }
}

/// Start a session and deliver the greeting straight away.
pub fn greet(controller: &mut DialogueController, story: &str, character: &str) -> Result<()> {
    let greeting = controller.start_session(story, character);
    controller
        .deliver(&greeting)
        .with_context(|| format!("greeting for {story}/{character} was not delivered"))?;
    Ok(())
}

pub fn expect_reply(submission: Submission) -> Result<PendingReply> {
    match submission {
        Submission::Reply(pending) => Ok(pending),
        other => anyhow::bail!("expected a scheduled reply, got {other:?}"),
    }
}

/// Say `text` and deliver the answer. Returns the stage the character replied from.
pub fn say(controller: &mut DialogueController, text: &str) -> Result<StageId> {
    let pending = expect_reply(controller.submit_input(UserInput::text(text)))?;
    deliver(controller, &pending)
}

/// Pick the first pending option of the latest message and deliver the answer.
pub fn choose_first(controller: &mut DialogueController) -> Result<StageId> {
    let last = controller
        .session()
        .and_then(|s| s.last_message())
        .context("no message to answer")?
        .clone();
    let option = last
        .pending_options()
        .first()
        .cloned()
        .with_context(|| format!("message {} offers no options", last.id))?;
    let pending = expect_reply(controller.submit_input(UserInput::choice(last.id, option)))?;
    deliver(controller, &pending)
}

fn deliver(controller: &mut DialogueController, pending: &PendingReply) -> Result<StageId> {
    let message = controller
        .deliver(pending)
        .context("reply was not delivered")?;
    message.stage.context("character reply carries no stage")
}

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    match name.to_lowercase().as_str() {
        "smoke" => Some(TestScenario::new("Smoke Test", smoke::run)),
        "full-arc" | "arc" => Some(TestScenario::new(
            "Full Story Arc",
            dialogue::full_arc,
        )),
        "switch" | "stale-reply" => Some(TestScenario::new(
            "Story Switch Discards Stale Replies",
            dialogue::switch_story,
        )),
        "fallback" => Some(TestScenario::new(
            "Response Fallback Chain",
            dialogue::fallback_chain,
        )),
        "persistence" | "saves" => Some(TestScenario::new(
            "Save, Bookmark and Resume",
            storage::persistence,
        )),
        "recommend" | "recommendations" => Some(TestScenario::new(
            "Rating-based Recommendations",
            storage::recommendations,
        )),
        _ => None,
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("smoke", "Smoke Test"),
        ("full-arc", "Full Story Arc"),
        ("switch", "Story Switch Discards Stale Replies"),
        ("fallback", "Response Fallback Chain"),
        ("persistence", "Save, Bookmark and Resume"),
        ("recommend", "Rating-based Recommendations"),
    ]
}
