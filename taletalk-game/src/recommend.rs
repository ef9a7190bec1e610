//! Story suggestions from the user's rating history.
use serde::{Deserialize, Serialize};

use crate::content::Story;
use crate::persistence::UserRating;

const COLD_START_SCORE: f64 = 0.8;
const BASE_SCORE: f64 = 0.5;
const GENRE_BONUS: f64 = 0.3;
const TAG_BONUS: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub story_id: String,
    pub score: f64,
    pub reason: String,
}

/// Rank unrated stories for the user.
///
/// With no ratings the first `limit` stories are returned as popular picks.
/// Otherwise every unrated story starts at a base score and gains a bonus for
/// sharing a genre with a highly rated story, plus a bonus per hashtag shared
/// with highly rated stories. The hashtag reason wins over the genre reason.
/// Ties keep catalogue order.
#[must_use]
pub fn recommend(stories: &[Story], ratings: &[UserRating], limit: usize) -> Vec<Recommendation> {
    if ratings.is_empty() {
        return stories
            .iter()
            .take(limit)
            .map(|story| Recommendation {
                story_id: story.id.clone(),
                score: COLD_START_SCORE,
                reason: "인기 이야기입니다".to_string(),
            })
            .collect();
    }

    let liked: Vec<&Story> = ratings
        .iter()
        .filter(|r| r.is_high())
        .filter_map(|r| stories.iter().find(|s| s.id == r.story_id))
        .collect();

    let mut ranked: Vec<Recommendation> = stories
        .iter()
        .filter(|story| !ratings.iter().any(|r| r.story_id == story.id))
        .map(|story| score_story(story, &liked))
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

fn score_story(story: &Story, liked: &[&Story]) -> Recommendation {
    let mut score = BASE_SCORE;
    let mut reason = "새로운 이야기".to_string();

    if liked.iter().any(|s| s.genre == story.genre) {
        score += GENRE_BONUS;
        reason = format!("선호하시는 {} 장르입니다", story.genre);
    }

    let shared: Vec<&str> = story
        .hashtags
        .iter()
        .filter(|tag| liked.iter().any(|s| s.hashtags.contains(*tag)))
        .map(String::as_str)
        .collect();
    if !shared.is_empty() {
        score += TAG_BONUS * shared.len() as f64;
        reason = format!("{} 태그를 좋아하실 것 같아요", shared.join(", "));
    }

    Recommendation {
        story_id: story.id.clone(),
        score,
        reason,
    }
}
