use std::collections::HashMap;

use crate::models::Candidate;

/// Boost first-event candidates that are followed by a second-event match.
///
/// For every `(f, s)` sharing a video with `0 < s.frame_id - f.frame_id <= window`,
/// the bonus is `s.score * (window - diff) / window`, so a second event right
/// after the first counts almost fully and one at the edge of the window
/// counts nothing. Each first candidate keeps only its best bonus.
///
/// Results are stably sorted by boosted score and truncated to `limit`.
pub fn score_temporal_pairs(
    mut first: Vec<Candidate>,
    second: &[Candidate],
    window: i64,
    limit: usize,
) -> Vec<Candidate> {
    if window <= 0 {
        first.truncate(limit);
        return first;
    }

    let mut by_video: HashMap<&str, Vec<&Candidate>> = HashMap::new();
    for s in second {
        by_video.entry(s.video.as_str()).or_default().push(s);
    }

    for f in first.iter_mut() {
        let Some(followers) = by_video.get(f.video.as_str()) else {
            continue;
        };

        let bonus = followers
            .iter()
            .filter_map(|s| {
                let diff = s.frame_id - f.frame_id;
                (diff > 0 && diff <= window)
                    .then(|| s.score * (window - diff) as f32 / window as f32)
            })
            .fold(0.0f32, f32::max);

        f.score += bonus;
    }

    // sort_by is stable: equal scores keep retrieval order
    first.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    first.truncate(limit);
    first
}
