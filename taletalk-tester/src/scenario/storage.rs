use anyhow::{Context, Result, ensure};
use chrono::Utc;
use std::sync::Arc;

use super::{ScenarioCtx, choose_first, greet};
use taletalk_game::{MemoryStore, StoryEngine, UserRating};

fn engine(ctx: &ScenarioCtx) -> StoryEngine<MemoryStore> {
    StoryEngine::new(Arc::clone(&ctx.content), ctx.config.clone(), MemoryStore::new())
}

/// Save two conversations, bookmark one, then resume the other.
pub fn persistence(ctx: &ScenarioCtx) -> Result<()> {
    let engine = engine(ctx);

    let mut winston = engine.controller();
    greet(&mut winston, "1984", "winston")?;
    choose_first(&mut winston)?;
    choose_first(&mut winston)?;
    engine.save(&winston)?.context("winston was not saved")?;

    let mut kitaek = engine.controller();
    greet(&mut kitaek, "parasite", "kitaek")?;
    engine.save(&kitaek)?.context("kitaek was not saved")?;
    engine.save(&kitaek)?;

    let store = engine.progress_store();
    ensure!(store.list_all()?.len() == 2, "re-saving must upsert");
    ensure!(
        store.toggle_bookmark("parasite", "kitaek")? == Some(true),
        "bookmark toggle failed"
    );
    ensure!(store.bookmarked()?.len() == 1, "bookmark not listed");
    let recent = engine.recent()?;
    ensure!(
        recent.len() == 1 && recent[0].story_id == "1984",
        "recent list should only hold winston"
    );

    let mut resumed = engine.controller();
    ensure!(
        engine.resume_into(&mut resumed, "1984", "winston")?,
        "saved conversation not found"
    );
    ensure!(
        resumed.session() == winston.session(),
        "resumed session differs from the saved one"
    );

    ensure!(store.delete_one("1984", "winston")?, "delete failed");
    ensure!(store.find("1984", "winston")?.is_none(), "record survived delete");
    if ctx.verbose {
        println!("  💾 {} record(s) left", store.list_all()?.len());
    }
    Ok(())
}

/// Cold-start picks, then genre and hashtag affinity after a high rating.
pub fn recommendations(ctx: &ScenarioCtx) -> Result<()> {
    let engine = engine(ctx);
    let cold = engine.recommendations()?;
    ensure!(
        cold.len() == ctx.config.recommendation_limit.min(ctx.content.stories().len()),
        "cold start returned {} picks",
        cold.len()
    );

    ensure!(
        UserRating::new("parasite", 0, "", Utc::now()).is_err(),
        "zero stars must be rejected"
    );
    let rating = UserRating::new("parasite", 5, "계획이 다 있었네요", Utc::now())?;
    engine.progress_store().save_rating(&rating)?;

    let warm = engine.recommendations()?;
    ensure!(
        warm.iter().all(|r| r.story_id != "parasite"),
        "rated story was recommended"
    );
    let top = warm.first().context("no recommendations after rating")?;
    ensure!(top.story_id == "squid-game", "unexpected top pick {}", top.story_id);
    if ctx.verbose {
        for pick in &warm {
            println!("  ⭐ {} {:.1} {}", pick.story_id, pick.score, pick.reason);
        }
    }
    Ok(())
}
