use std::collections::BTreeMap;

use crate::models::{Candidate, TimeGap};

const COMPLETENESS_WEIGHT: f32 = 0.5;
const SIMILARITY_WEIGHT: f32 = 0.4;
const COHERENCE_WEIGHT: f32 = 0.1;

/// A chain of step matches inside one video, anchored on a step-0 candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialPath {
    pub video: String,
    pub anchor: Candidate,
    pub num_steps: usize,
    /// Ascending step indices that found a match; always starts with 0
    pub matched_steps: Vec<usize>,
    /// Matched frame id per entry of `matched_steps`
    pub step_frames: Vec<i64>,
    pub completeness: f32,
    pub coherence: f32,
    pub similarity: f32,
    pub score: f32,
}

/// Build one path per step-0 candidate.
///
/// Each later step takes the highest-scoring same-video candidate strictly
/// after the last matched frame (first one wins on ties). If
/// `constraints[i - 1]` is set, the frame gap into step `i` must also fall in
/// `[min_seconds * fps, max_seconds * fps]` using the anchor's fps. A step
/// with no admissible candidate is skipped and the chain continues from the
/// same frame.
pub fn build_paths(
    step_results: &[Vec<Candidate>],
    constraints: &[Option<TimeGap>],
) -> Vec<SequentialPath> {
    let num_steps = step_results.len();
    if num_steps == 0 {
        return Vec::new();
    }

    // video -> step -> candidates in retrieval order
    let mut by_video: BTreeMap<&str, Vec<Vec<&Candidate>>> = BTreeMap::new();
    for (step, results) in step_results.iter().enumerate() {
        for c in results {
            by_video
                .entry(c.video.as_str())
                .or_insert_with(|| vec![Vec::new(); num_steps])[step]
                .push(c);
        }
    }

    let mut paths = Vec::new();
    for (video, steps) in &by_video {
        for anchor in &steps[0] {
            let mut matched_steps = vec![0];
            let mut step_frames = vec![anchor.frame_id];
            let mut last_frame = anchor.frame_id;

            for (step, pool) in steps.iter().enumerate().skip(1) {
                let gap = constraints.get(step - 1).copied().flatten();
                let mut best: Option<&Candidate> = None;
                for c in pool {
                    let diff = c.frame_id - last_frame;
                    if diff <= 0 || !gap_allows(gap, diff, anchor.fps) {
                        continue;
                    }
                    if best.map_or(true, |b| c.score > b.score) {
                        best = Some(c);
                    }
                }
                if let Some(best) = best {
                    matched_steps.push(step);
                    step_frames.push(best.frame_id);
                    last_frame = best.frame_id;
                }
            }

            let completeness = matched_steps.len() as f32 / num_steps as f32;
            paths.push(SequentialPath {
                video: video.to_string(),
                anchor: (*anchor).clone(),
                num_steps,
                matched_steps,
                step_frames,
                completeness,
                coherence: 0.0,
                similarity: 0.0,
                score: 0.0,
            });
        }
    }

    paths
}

fn gap_allows(gap: Option<TimeGap>, diff_frames: i64, fps: f64) -> bool {
    let Some(gap) = gap else {
        return true;
    };
    let diff = diff_frames as f64;
    if diff < gap.min_seconds * fps {
        return false;
    }
    gap.max_seconds.map_or(true, |max| diff <= max * fps)
}

/// Fill in coherence, similarity and the composite score.
///
/// With `require_all_steps`, incomplete paths are dropped first.
pub fn score_paths(paths: Vec<SequentialPath>, require_all_steps: bool) -> Vec<SequentialPath> {
    paths
        .into_iter()
        .filter(|p| !require_all_steps || p.completeness >= 1.0)
        .map(|mut p| {
            p.similarity = 1.0 - p.anchor.distance();
            p.coherence = coherence(&p.matched_steps, p.num_steps);
            p.score = COMPLETENESS_WEIGHT * p.completeness
                + SIMILARITY_WEIGHT * p.similarity
                + COHERENCE_WEIGHT * p.coherence;
            p
        })
        .collect()
}

/// Index-consecutive matched-step pairs over the `num_steps - 1` transitions
/// a full chain would have.
fn coherence(matched_steps: &[usize], num_steps: usize) -> f32 {
    if num_steps < 2 {
        return 0.0;
    }
    let transitions = num_steps - 1;
    let consecutive = matched_steps
        .windows(2)
        .filter(|w| w[1] == w[0] + 1)
        .count();
    consecutive as f32 / transitions as f32
}

/// Build, score and return the `top_k` best paths, highest score first.
pub fn rank_paths(
    step_results: &[Vec<Candidate>],
    constraints: &[Option<TimeGap>],
    require_all_steps: bool,
    top_k: usize,
) -> Vec<SequentialPath> {
    let mut scored = score_paths(build_paths(step_results, constraints), require_all_steps);
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
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

    #[test]
    fn test_skipped_step_reduces_completeness() {
        let steps = vec![
            vec![cand("A", 10, 0.8)],
            vec![cand("A", 20, 0.7)],
            vec![cand("A", 5, 0.9)],
        ];
        let paths = rank_paths(&steps, &[], false, 10);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].matched_steps, vec![0, 1]);
        assert_eq!(paths[0].step_frames, vec![10, 20]);
        assert!((paths[0].completeness - 2.0 / 3.0).abs() < 1e-6);
        // One consecutive pair out of two transitions
        assert!((paths[0].coherence - 0.5).abs() < 1e-6);
        // 0.5 * 2/3 + 0.4 * 0.8 + 0.1 * 0.5
        assert!((paths[0].score - 0.703_333).abs() < 1e-5);
    }

    #[test]
    fn test_partial_chain_scores_below_complete_chain() {
        let steps = vec![
            vec![cand("A", 10, 0.8), cand("B", 10, 0.8)],
            vec![cand("A", 20, 0.7), cand("B", 20, 0.7)],
            vec![cand("A", 30, 0.6)],
        ];
        let paths = rank_paths(&steps, &[], false, 10);
        assert_eq!(paths[0].video, "A");
        assert!((paths[0].coherence - 1.0).abs() < 1e-6);
        assert_eq!(paths[1].video, "B");
        assert!((paths[1].coherence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_step_has_zero_coherence() {
        let steps = vec![vec![cand("A", 10, 0.8)]];
        let paths = rank_paths(&steps, &[], false, 10);
        assert_eq!(paths[0].coherence, 0.0);
        assert!((paths[0].completeness - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_composite_score() {
        let steps = vec![vec![cand("A", 10, 0.8)], vec![cand("A", 20, 0.7)]];
        let paths = rank_paths(&steps, &[], false, 10);
        // 0.5 * 1.0 + 0.4 * 0.8 + 0.1 * 1.0
        assert!((paths[0].score - 0.92).abs() < 1e-5);
        assert!((paths[0].similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_non_consecutive_match_lowers_coherence() {
        let steps = vec![
            vec![cand("A", 10, 0.8)],
            vec![cand("B", 20, 0.7)],
            vec![cand("A", 30, 0.9)],
        ];
        let paths = rank_paths(&steps, &[], false, 10);
        assert_eq!(paths[0].matched_steps, vec![0, 2]);
        assert_eq!(paths[0].coherence, 0.0);
    }

    #[test]
    fn test_single_match_has_zero_coherence() {
        let steps = vec![vec![cand("A", 10, 0.8)], vec![]];
        let paths = rank_paths(&steps, &[], false, 10);
        assert_eq!(paths[0].coherence, 0.0);
        assert!((paths[0].completeness - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_require_all_steps_drops_partial_chains() {
        let steps = vec![
            vec![cand("A", 10, 0.8), cand("B", 10, 0.9)],
            vec![cand("A", 20, 0.7)],
        ];
        let paths = rank_paths(&steps, &[], true, 10);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].video, "A");
    }

    #[test]
    fn test_best_follower_chosen_greedily() {
        let steps = vec![
            vec![cand("A", 10, 0.8)],
            vec![cand("A", 40, 0.5), cand("A", 30, 0.9)],
            vec![cand("A", 35, 0.6)],
        ];
        let paths = rank_paths(&steps, &[], false, 10);
        // Step 1 picks frame 30 (best), so step 2 at 35 still follows
        assert_eq!(paths[0].step_frames, vec![10, 30, 35]);
    }

    #[test]
    fn test_time_gap_uses_anchor_fps() {
        let steps = vec![
            vec![cand("A", 0, 0.8)],
            vec![cand("A", 20, 0.9), cand("A", 100, 0.5), cand("A", 500, 0.95)],
        ];
        // 2s..10s at 25fps = 50..250 frames
        let gap = TimeGap {
            min_seconds: 2.0,
            max_seconds: Some(10.0),
        };
        let paths = rank_paths(&steps, &[Some(gap)], false, 10);
        assert_eq!(paths[0].step_frames, vec![0, 100]);
    }

    #[test]
    fn test_missing_max_is_unbounded() {
        let steps = vec![vec![cand("A", 0, 0.8)], vec![cand("A", 100_000, 0.9)]];
        let gap = TimeGap {
            min_seconds: 1.0,
            max_seconds: None,
        };
        let paths = rank_paths(&steps, &[Some(gap)], false, 10);
        assert_eq!(paths[0].matched_steps, vec![0, 1]);
    }

    #[test]
    fn test_several_chains_per_video_and_top_k() {
        let steps = vec![
            vec![cand("A", 10, 0.9), cand("A", 50, 0.6), cand("B", 0, 0.7)],
            vec![cand("A", 60, 0.8)],
        ];
        let paths = rank_paths(&steps, &[], false, 2);
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.video == "A"));
        assert!(paths[0].score >= paths[1].score);
    }

    #[test]
    fn test_empty_steps() {
        assert!(rank_paths(&[], &[], false, 10).is_empty());
    }
}
