//! Terminal conversation loop backed by a persistent store.
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use taletalk_game::typing::deliver_after_delay;
use taletalk_game::{
    DialogueController, KeyValueStore, Message, StoryEngine, Submission, UserInput, UserRating,
};

type SharedController = Rc<RefCell<DialogueController>>;

#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub story: String,
    pub character: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Help,
    Quit,
    Save,
    Bookmark,
    Rate { stars: u8, feedback: &'a str },
    Recommend,
    Recent,
    Stories,
    Story { story: &'a str, character: Option<&'a str> },
    Character(&'a str),
    Choose(usize),
    Say(&'a str),
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return match line.parse::<usize>() {
            Ok(n) if n > 0 => Command::Choose(n),
            _ => Command::Say(line),
        };
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    match name {
        "help" | "h" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        "save" => Command::Save,
        "bookmark" => Command::Bookmark,
        "recommend" => Command::Recommend,
        "recent" => Command::Recent,
        "stories" => Command::Stories,
        "rate" => {
            let (stars, feedback) = args.split_once(' ').unwrap_or((args, ""));
            stars.parse().map_or(Command::Unknown(line), |stars| Command::Rate {
                stars,
                feedback: feedback.trim(),
            })
        }
        "story" if !args.is_empty() => {
            let mut parts = args.split_whitespace();
            match parts.next() {
                Some(story) => Command::Story {
                    story,
                    character: parts.next(),
                },
                None => Command::Unknown(line),
            }
        }
        "character" if !args.is_empty() => Command::Character(args),
        _ => Command::Unknown(line),
    }
}

/// Run the interactive loop until `/quit` or end of input. The active
/// conversation is saved on exit.
pub async fn run<S, R, W>(
    engine: &StoryEngine<S>,
    options: &PlayOptions,
    input: R,
    out: &mut W,
) -> Result<()>
where
    S: KeyValueStore,
    R: BufRead,
    W: Write,
{
    let (story, character) = pick_pair(engine, options.story.as_str(), options.character.as_deref())?;
    let controller: SharedController = Rc::new(RefCell::new(engine.controller()));
    open_conversation(engine, &controller, &story, &character, out).await?;

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        match parse_command(&line) {
            Command::Empty => {}
            Command::Help => print_help(out)?,
            Command::Quit => break,
            Command::Save => {
                if engine.save(&*controller.borrow())?.is_some() {
                    writeln!(out, "{}", "💾 저장했습니다".green())?;
                }
            }
            Command::Bookmark => toggle_bookmark(engine, &controller, out)?,
            Command::Rate { stars, feedback } => rate(engine, &controller, stars, feedback, out)?,
            Command::Recommend => {
                for pick in engine.recommendations()? {
                    let title = engine
                        .content()
                        .story(&pick.story_id)
                        .map_or(pick.story_id.as_str(), |s| s.title.as_str());
                    writeln!(out, "⭐ {title} ({:.1}) - {}", pick.score, pick.reason)?;
                }
            }
            Command::Recent => {
                for saved in engine.recent()? {
                    writeln!(
                        out,
                        "🕘 {}/{} {}% ({})",
                        saved.story_id,
                        saved.character_id,
                        saved.progress,
                        saved.timestamp.format("%Y-%m-%d %H:%M")
                    )?;
                }
            }
            Command::Stories => print_stories(engine, out)?,
            Command::Story { story, character } => match pick_pair(engine, story, character) {
                Ok((story, character)) => {
                    engine.save(&*controller.borrow())?;
                    open_conversation(engine, &controller, &story, &character, out).await?;
                }
                Err(e) => writeln!(out, "{}", format!("⚠️  {e}").yellow())?,
            },
            Command::Character(character) => {
                let story = current_story(&controller);
                match pick_pair(engine, &story, Some(character)) {
                    Ok((story, character)) => {
                        engine.save(&*controller.borrow())?;
                        open_conversation(engine, &controller, &story, &character, out).await?;
                    }
                    Err(e) => writeln!(out, "{}", format!("⚠️  {e}").yellow())?,
                }
            }
            Command::Choose(n) => {
                let choice = nth_option(&controller, n);
                let input = choice.unwrap_or_else(|| UserInput::text(line.trim()));
                converse(engine, &controller, input, out).await?;
            }
            Command::Say(text) => {
                converse(engine, &controller, UserInput::text(text), out).await?;
            }
            Command::Unknown(raw) => {
                writeln!(out, "{}", format!("⚠️  알 수 없는 명령: {raw}").yellow())?;
            }
        }
        out.flush()?;
    }

    engine.save(&*controller.borrow())?;
    Ok(())
}

fn pick_pair<S: KeyValueStore>(
    engine: &StoryEngine<S>,
    story_id: &str,
    character_id: Option<&str>,
) -> Result<(String, String)> {
    let story = engine
        .content()
        .story(story_id)
        .with_context(|| format!("unknown story `{story_id}`"))?;
    let character = match character_id {
        Some(id) => story
            .character(id)
            .with_context(|| format!("unknown character `{id}` in {story_id}"))?,
        None => story
            .characters
            .first()
            .with_context(|| format!("{story_id} has no characters"))?,
    };
    Ok((story.id.clone(), character.id.clone()))
}

fn current_story(controller: &SharedController) -> String {
    controller
        .borrow()
        .session()
        .map(|s| s.story_id.clone())
        .unwrap_or_default()
}

/// Resume a saved conversation or greet from scratch.
async fn open_conversation<S, W>(
    engine: &StoryEngine<S>,
    controller: &SharedController,
    story: &str,
    character: &str,
    out: &mut W,
) -> Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    let resumed = engine.resume_into(&mut *controller.borrow_mut(), story, character)?;
    if resumed {
        writeln!(out, "{}", "📂 이전 대화를 이어갑니다".cyan())?;
        let last = controller
            .borrow()
            .session()
            .and_then(|s| s.last_message().cloned());
        if let Some(message) = last {
            render_message(controller, &message, out)?;
        }
        return Ok(());
    }

    let greeting = controller.borrow_mut().start_session(story, character);
    typing_indicator(out)?;
    if let Some(message) = deliver_after_delay(controller, greeting).await {
        render_message(controller, &message, out)?;
    }
    Ok(())
}

async fn converse<S, W>(
    engine: &StoryEngine<S>,
    controller: &SharedController,
    input: UserInput,
    out: &mut W,
) -> Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    let submission = controller.borrow_mut().submit_input(input);
    match submission {
        Submission::Reply(pending) => {
            typing_indicator(out)?;
            if let Some(message) = deliver_after_delay(controller, pending).await {
                render_message(controller, &message, out)?;
            }
        }
        Submission::SwitchStory => {
            writeln!(out, "{}", "🔀 다른 이야기를 골라 주세요 (/story <id>)".cyan())?;
            print_stories(engine, out)?;
        }
        Submission::Ignored => log::debug!("Input ignored"),
    }
    Ok(())
}

fn nth_option(controller: &SharedController, n: usize) -> Option<UserInput> {
    let controller = controller.borrow();
    let last = controller.session()?.last_message()?;
    let option = last.pending_options().get(n.checked_sub(1)?)?;
    Some(UserInput::choice(last.id.clone(), option.clone()))
}

fn toggle_bookmark<S, W>(
    engine: &StoryEngine<S>,
    controller: &SharedController,
    out: &mut W,
) -> Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    let Some(saved) = engine.save(&*controller.borrow())? else {
        return Ok(());
    };
    let flag = engine
        .progress_store()
        .toggle_bookmark(&saved.story_id, &saved.character_id)?;
    let label = if flag == Some(true) {
        "🔖 북마크했습니다"
    } else {
        "🔖 북마크를 해제했습니다"
    };
    writeln!(out, "{}", label.green())?;
    Ok(())
}

fn rate<S, W>(
    engine: &StoryEngine<S>,
    controller: &SharedController,
    stars: u8,
    feedback: &str,
    out: &mut W,
) -> Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    let story = current_story(controller);
    match UserRating::new(story, stars, feedback, Utc::now()) {
        Ok(rating) => {
            engine.progress_store().save_rating(&rating)?;
            writeln!(out, "{}", format!("⭐ {stars}점을 남겼습니다").green())?;
        }
        Err(e) => writeln!(out, "{}", format!("⚠️  {e}").yellow())?,
    }
    Ok(())
}

fn typing_indicator<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{}", "…".dimmed())?;
    out.flush()?;
    Ok(())
}

fn render_message<W: Write>(
    controller: &SharedController,
    message: &Message,
    out: &mut W,
) -> Result<()> {
    let speaker = match (&message.character_avatar, &message.character_name) {
        (Some(avatar), Some(name)) => format!("[{avatar}] {name}"),
        _ => "이야기꾼".to_string(),
    };
    writeln!(out, "{}", speaker.bright_white().bold())?;
    for paragraph in message.paragraphs() {
        writeln!(out, "  {paragraph}")?;
    }
    if let Some(url) = &message.image_url {
        writeln!(out, "  🖼  {url}")?;
    }
    for (i, option) in message.pending_options().iter().enumerate() {
        writeln!(out, "  {}. {option}", i + 1)?;
    }

    let controller = controller.borrow();
    if let Some(session) = controller.session() {
        let band = session.progress_band();
        writeln!(
            out,
            "{}",
            format!("  [{band} {}%] 삽화 {}장", session.progress(), session.illustrations().len())
                .dimmed()
        )?;
    }
    Ok(())
}

fn print_stories<S, W>(engine: &StoryEngine<S>, out: &mut W) -> Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    for story in engine.content().stories() {
        let characters: Vec<&str> = story.characters.iter().map(|c| c.id.as_str()).collect();
        writeln!(
            out,
            "📚 {} ({}) [{}] - {}",
            story.title,
            story.id,
            story.genre,
            characters.join(", ")
        )?;
    }
    Ok(())
}

fn print_help<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  <text>                 talk to the character")?;
    writeln!(out, "  <n>                    pick option n of the last message")?;
    writeln!(out, "  /story <id> [char]     open another story")?;
    writeln!(out, "  /character <id>        talk to another character")?;
    writeln!(out, "  /stories               list stories")?;
    writeln!(out, "  /save, /bookmark       save or bookmark this conversation")?;
    writeln!(out, "  /rate <1-5> [text]     rate the current story")?;
    writeln!(out, "  /recommend, /recent    suggestions and recent saves")?;
    writeln!(out, "  /quit                  leave")?;
    Ok(())
}
