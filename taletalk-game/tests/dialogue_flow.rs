use std::sync::Arc;

use chrono::{TimeZone, Utc};
use taletalk_game::{
    ContentLibrary, DialogueConfig, DialogueController, FixedClock, MemoryStore, ProgressBand,
    ProgressStore, StageId, StoryEngine, Submission, UserInput,
};

fn controller() -> DialogueController<FixedClock> {
    let content = Arc::new(ContentLibrary::builtin().unwrap());
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 7, 1, 21, 0, 0).unwrap());
    DialogueController::with_clock(content, DialogueConfig::instant(), clock)
}

fn greet(controller: &mut DialogueController<FixedClock>, story: &str, character: &str) {
    let greeting = controller.start_session(story, character);
    controller.deliver(&greeting).unwrap();
}

/// Pick the first offered option of the latest message and deliver the reply.
fn take_first_option(controller: &mut DialogueController<FixedClock>) -> StageId {
    let last = controller.session().unwrap().last_message().unwrap().clone();
    let option = last.pending_options().first().cloned().unwrap();
    let Submission::Reply(pending) = controller.submit_input(UserInput::choice(last.id, option))
    else {
        panic!("option did not schedule a reply");
    };
    controller.deliver(&pending).unwrap().stage.unwrap()
}

#[test]
fn winston_arc_walks_every_stage_by_options() {
    let mut controller = controller();
    greet(&mut controller, "1984", "winston");

    let mut visited = vec![StageId::Greeting];
    let mut last_progress = 0;
    while visited.last() != Some(&StageId::Ending) {
        let stage = take_first_option(&mut controller);
        let progress = controller.session().unwrap().progress();
        assert!(progress >= last_progress, "progress went backwards at {stage}");
        last_progress = progress;
        visited.push(stage);
        assert!(visited.len() <= StageId::PROGRESSION.len());
    }

    assert_eq!(visited, StageId::PROGRESSION.to_vec());
    let session = controller.session().unwrap();
    assert_eq!(session.progress(), 100);
    assert_eq!(session.progress_band(), ProgressBand::Finale);
    assert_eq!(session.messages().len(), 1 + 2 * 8);
}

#[test]
fn attic_illustration_is_collected_once() {
    let mut controller = controller();
    greet(&mut controller, "1984", "winston");
    for _ in 0..5 {
        take_first_option(&mut controller);
    }
    let session = controller.session().unwrap();
    assert_eq!(session.stage(), StageId::ObrienTrap);

    let attic_messages = session
        .messages()
        .iter()
        .filter(|m| matches!(m.stage, Some(StageId::SecretRoom | StageId::ObrienTrap)))
        .filter_map(|m| m.image_url.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(attic_messages.len(), 2);
    assert_eq!(attic_messages[0], attic_messages[1]);

    let illustrations = session.illustrations();
    assert_eq!(
        illustrations.iter().filter(|u| *u == attic_messages[0]).count(),
        1
    );
    let mut unique = illustrations.to_vec();
    unique.dedup();
    assert_eq!(unique.len(), illustrations.len());
}

#[test]
fn free_text_reaches_story_start() {
    let mut controller = controller();
    greet(&mut controller, "1984", "winston");
    let Submission::Reply(pending) = controller.submit_input(UserInput::text("이야기를 시작해줘"))
    else {
        panic!("expected reply");
    };
    let reply = controller.deliver(&pending).unwrap();
    assert!(reply.image_url.is_some());
    assert_eq!(reply.progress, Some(20));

    let session = controller.session().unwrap();
    assert_eq!(session.stage(), StageId::StoryStart);
    assert_eq!(session.messages().len(), 3);
    assert_eq!(session.illustrations().len(), 1);
}

#[test]
fn ending_keyword_short_circuits() {
    let mut controller = controller();
    greet(&mut controller, "1984", "winston");
    let Submission::Reply(pending) = controller.submit_input(UserInput::text("결말만 알려줘"))
    else {
        panic!("expected reply");
    };
    assert_eq!(pending.stage(), StageId::Ending);
    controller.deliver(&pending).unwrap();
    assert_eq!(controller.session().unwrap().progress(), 100);
}

#[test]
fn missing_stage_falls_back_to_character_default() {
    let mut controller = controller();
    greet(&mut controller, "1984", "julia");
    let Submission::Reply(pending) = controller.submit_input(UserInput::text("자기소개 해줘"))
    else {
        panic!("expected reply");
    };
    assert_eq!(pending.stage(), StageId::Introduction);
    let text = controller.deliver(&pending).unwrap().text.clone();

    let table = controller.content().table_for("1984", "julia");
    assert!(!table.has_stage(StageId::Introduction));
    assert_eq!(text, table.default_entry().text);
    assert_eq!(controller.session().unwrap().stage(), StageId::Introduction);
}

#[test]
fn progress_survives_store_round_trip() {
    let store = ProgressStore::new(MemoryStore::new());
    let mut controller = controller();
    greet(&mut controller, "1984", "winston");
    take_first_option(&mut controller);
    take_first_option(&mut controller);

    let snapshot = controller.snapshot(false).unwrap();
    store.save(&snapshot).unwrap();
    assert_eq!(store.toggle_bookmark("1984", "winston").unwrap(), Some(true));

    let saved = store.find("1984", "winston").unwrap().unwrap();
    assert!(saved.is_bookmarked);
    assert_eq!(saved.current_stage, controller.session().unwrap().stage());

    let mut resumed = self::controller();
    resumed.resume(&saved);
    assert_eq!(resumed.session(), controller.session());
    let next = take_first_option(&mut resumed);
    assert!(next > saved.current_stage);
    let ids: Vec<_> = resumed
        .session()
        .unwrap()
        .messages()
        .iter()
        .map(|m| m.id.clone())
        .collect();
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), ids.len());
}

#[test]
fn engine_lists_recent_conversations() {
    let engine = StoryEngine::builtin(DialogueConfig::instant(), MemoryStore::new()).unwrap();
    for (story, character) in [("1984", "winston"), ("parasite", "kitaek"), ("kingdom", "changgun")]
    {
        let mut controller = engine.controller();
        let greeting = controller.start_session(story, character);
        controller.deliver(&greeting).unwrap();
        engine.save(&controller).unwrap();
    }
    engine
        .progress_store()
        .toggle_bookmark("parasite", "kitaek")
        .unwrap();

    let recent = engine.recent().unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|p| !p.is_bookmarked));
    assert_eq!(engine.progress_store().bookmarked().unwrap().len(), 1);
}
