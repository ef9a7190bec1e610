use anyhow::{Context, Result, ensure};

use super::{ScenarioCtx, greet, say};
use taletalk_game::StageId;

/// Every catalogued character can be greeted and answers one free-text turn.
pub fn run(ctx: &ScenarioCtx) -> Result<()> {
    ensure!(!ctx.content.stories().is_empty(), "catalogue is empty");

    for story in ctx.content.stories() {
        ensure!(
            !story.characters.is_empty(),
            "story {} has no characters",
            story.id
        );
        for character in &story.characters {
            let mut controller = ctx.controller();
            greet(&mut controller, &story.id, &character.id)?;

            let greeting = controller
                .session()
                .and_then(|s| s.last_message())
                .context("greeting missing")?;
            ensure!(
                greeting.character_name.as_deref() == Some(character.name.as_str()),
                "greeting for {}/{} is not attributed to {}",
                story.id,
                character.id,
                character.name
            );

            let stage = say(&mut controller, "안녕하세요")?;
            ensure!(
                StageId::Greeting.allowed_next().contains(&stage),
                "{}/{} jumped to {stage}",
                story.id,
                character.id
            );

            if ctx.verbose {
                println!("  💬 {} / {} → {stage}", story.title, character.name);
            }
        }
    }
    Ok(())
}
