use anyhow::{Context, Result, ensure};

use super::{ScenarioCtx, choose_first, expect_reply, greet, say};
use taletalk_game::{ProgressBand, StageId, Submission, TurnPhase, UserInput};

/// Follow the first option at every turn from greeting to ending.
pub fn full_arc(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.controller();
    greet(&mut controller, "1984", "winston")?;

    let mut visited = vec![StageId::Greeting];
    let mut last_progress = 0;
    while visited.last() != Some(&StageId::Ending) {
        ensure!(
            visited.len() <= StageId::PROGRESSION.len(),
            "arc did not terminate: {visited:?}"
        );
        let stage = choose_first(&mut controller)?;
        let progress = controller.session().context("session lost")?.progress();
        ensure!(
            progress >= last_progress,
            "progress fell from {last_progress} to {progress} at {stage}"
        );
        if ctx.verbose {
            println!("  📖 {stage} ({progress}%)");
        }
        last_progress = progress;
        visited.push(stage);
    }

    ensure!(
        visited == StageId::PROGRESSION,
        "unexpected path {visited:?}"
    );
    ensure!(
        controller.progress_band() == Some(ProgressBand::Finale),
        "ending did not reach the final band"
    );
    Ok(())
}

/// A story switch makes the in-flight reply stale, and switch phrases exit the dialogue.
pub fn switch_story(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.controller();
    greet(&mut controller, "1984", "winston")?;

    let stale = expect_reply(controller.submit_input(UserInput::text("이야기를 시작해줘")))?;
    ensure!(
        controller.phase() == TurnPhase::AwaitingCharacterReply,
        "reply should be pending"
    );
    ensure!(
        controller.submit_input(UserInput::text("기다릴 수 없어요")) == Submission::Ignored,
        "input during a pending reply must be ignored"
    );

    let greeting = controller.start_session("squid-game", "gihun");
    ensure!(
        controller.deliver(&stale).is_none(),
        "stale reply leaked into the new session"
    );
    controller
        .deliver(&greeting)
        .context("new greeting was not delivered")?;

    let session = controller.session().context("session lost")?;
    ensure!(session.story_id == "squid-game", "story did not switch");
    ensure!(session.messages().len() == 1, "old messages carried over");
    ensure!(session.progress() == 0, "progress carried over");

    ensure!(
        controller.submit_input(UserInput::text("다른 작품 이야기가 듣고 싶어요"))
            == Submission::SwitchStory,
        "switch phrase was not recognised"
    );
    ensure!(
        controller.phase() == TurnPhase::Idle,
        "switch request must not schedule a reply"
    );
    Ok(())
}

/// Stage lookups degrade to the character default and then the generic table.
pub fn fallback_chain(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.controller();
    greet(&mut controller, "1984", "julia")?;
    let stage = say(&mut controller, "자기소개를 해주세요")?;
    ensure!(stage == StageId::Introduction, "expected introduction, got {stage}");
    let julia = ctx.content.table_for("1984", "julia");
    let reply = controller
        .session()
        .and_then(|s| s.last_message())
        .context("reply missing")?;
    ensure!(
        reply.text == julia.default_entry().text,
        "julia should answer from her default entry"
    );

    let mut controller = ctx.controller();
    greet(&mut controller, "unknown-story", "nobody")?;
    let generic = ctx.content.table_for("unknown-story", "nobody");
    let greeting = controller
        .session()
        .and_then(|s| s.last_message())
        .context("greeting missing")?;
    ensure!(
        greeting.text == generic.entry(StageId::Greeting).text,
        "unknown pair should use the generic greeting"
    );
    ensure!(
        greeting.character_name.is_none(),
        "unknown character must not be attributed"
    );
    Ok(())
}
