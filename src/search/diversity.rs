use std::collections::HashMap;

use crate::config::DiversityConfig;
use crate::models::Candidate;

/// Spreads a ranked list across videos so one long video cannot fill the page.
#[derive(Debug, Clone)]
pub struct DiversityFilter {
    pub min_gap_frames: i64,
    pub max_per_video: usize,
    /// Per-video allowance added on top of `max_per_video` when backfilling
    pub backfill_slack: usize,
}

impl From<&DiversityConfig> for DiversityFilter {
    fn from(config: &DiversityConfig) -> Self {
        Self {
            min_gap_frames: config.min_gap_frames,
            max_per_video: config.max_per_video,
            backfill_slack: config.backfill_slack,
        }
    }
}

impl DiversityFilter {
    /// Two passes over `candidates` (already ranked):
    ///
    /// 1. Accept a candidate if its video is under `max_per_video` and no
    ///    accepted frame of that video lies within `min_gap_frames`.
    /// 2. If fewer than `max_results` were accepted, backfill in rank order
    ///    with the cap raised by `backfill_slack` and no gap check.
    ///
    /// The output keeps rank order within each pass.
    pub fn apply(&self, candidates: Vec<Candidate>, max_results: usize) -> Vec<Candidate> {
        let mut selected = vec![false; candidates.len()];
        let mut picked: Vec<usize> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut accepted_frames: HashMap<&str, Vec<i64>> = HashMap::new();

        for (i, c) in candidates.iter().enumerate() {
            if picked.len() >= max_results {
                break;
            }
            let count = counts.get(c.video.as_str()).copied().unwrap_or(0);
            if count >= self.max_per_video {
                continue;
            }
            let too_close = accepted_frames
                .get(c.video.as_str())
                .is_some_and(|frames| {
                    frames
                        .iter()
                        .any(|&f| (c.frame_id - f).abs() < self.min_gap_frames)
                });
            if too_close {
                continue;
            }

            selected[i] = true;
            picked.push(i);
            *counts.entry(c.video.as_str()).or_default() += 1;
            accepted_frames
                .entry(c.video.as_str())
                .or_default()
                .push(c.frame_id);
        }

        let relaxed_cap = self.max_per_video + self.backfill_slack;
        for (i, c) in candidates.iter().enumerate() {
            if picked.len() >= max_results {
                break;
            }
            if selected[i] {
                continue;
            }
            let count = counts.entry(c.video.as_str()).or_default();
            if *count < relaxed_cap {
                *count += 1;
                selected[i] = true;
                picked.push(i);
            }
        }

        let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
        picked
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(video: &str, frame_id: i64, score: f32) -> Candidate {
        Candidate {
            id: format!("{video}-{frame_id}"),
            score,
            video: video.to_string(),
            frame_id,
            keyframe_path: format!("L01/{video}/{frame_id}.jpg"),
            fps: 25.0,
            time_seconds: frame_id as f64 / 25.0,
        }
    }

    fn filter(min_gap_frames: i64, max_per_video: usize, backfill_slack: usize) -> DiversityFilter {
        DiversityFilter {
            min_gap_frames,
            max_per_video,
            backfill_slack,
        }
    }

    fn keys(out: &[Candidate]) -> Vec<(String, i64)> {
        out.iter().map(|c| (c.video.clone(), c.frame_id)).collect()
    }

    #[test]
    fn test_per_video_cap_without_slack() {
        let input = vec![cand("A", 100, 0.9), cand("A", 120, 0.8), cand("B", 10, 0.7)];
        let out = filter(50, 1, 0).apply(input, 100);
        assert_eq!(keys(&out), vec![("A".into(), 100), ("B".into(), 10)]);
    }

    #[test]
    fn test_gap_checked_against_every_accepted_frame() {
        let input = vec![
            cand("A", 100, 0.9),
            cand("A", 300, 0.8),
            // Far from 300 but within 50 of 100
            cand("A", 130, 0.7),
        ];
        let out = filter(50, 5, 0).apply(input, 100);
        assert_eq!(keys(&out), vec![("A".into(), 100), ("A".into(), 300)]);
    }

    #[test]
    fn test_backfill_ignores_gap_and_respects_relaxed_cap() {
        let input = vec![
            cand("A", 100, 0.9),
            cand("A", 110, 0.8),
            cand("A", 120, 0.7),
            cand("A", 130, 0.6),
        ];
        let out = filter(50, 1, 2).apply(input, 10);
        // Pass 1 takes 100; backfill adds two more up to cap 3
        assert_eq!(
            keys(&out),
            vec![("A".into(), 100), ("A".into(), 110), ("A".into(), 120)]
        );
    }

    #[test]
    fn test_stops_at_max_results() {
        let input = vec![cand("A", 0, 0.9), cand("B", 0, 0.8), cand("C", 0, 0.7)];
        let out = filter(50, 5, 5).apply(input, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].video, "B");
    }

    #[test]
    fn test_empty_input() {
        assert!(filter(50, 5, 5).apply(Vec::new(), 10).is_empty());
    }
}
