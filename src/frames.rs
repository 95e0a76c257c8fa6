//! Keyframe catalog: per-video frame rates, time derivation and on-disk
//! neighbor lookup.
//!
//! Keyframes are laid out as `<batch>/<video>/<frame_id>.jpg` under the
//! keyframes root. The video id exposed to callers is `<batch>_<video>`.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{Candidate, FrameHit, KisSegment, NeighborFrame, NeighborRequest};

pub const DEFAULT_FPS: f64 = 25.0;

/// Half-width of the KIS submission window.
const KIS_WINDOW_SECONDS: f64 = 0.5;

pub struct FrameCatalog {
    keyframes_dir: PathBuf,
    fps_map: HashMap<String, f64>,
}

impl FrameCatalog {
    pub fn new(keyframes_dir: impl Into<PathBuf>, fps_map: HashMap<String, f64>) -> Self {
        Self {
            keyframes_dir: keyframes_dir.into(),
            fps_map,
        }
    }

    /// Build the catalog, reading the fps map if one is configured.
    /// A missing or unreadable map falls back to `DEFAULT_FPS` everywhere.
    pub fn load(keyframes_dir: &Path, fps_map_path: Option<&Path>) -> Self {
        let fps_map = match fps_map_path {
            Some(path) => match read_fps_map(path) {
                Ok(map) => {
                    tracing::info!("Loaded {} fps entries from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    tracing::warn!("Fps map unavailable, using {DEFAULT_FPS}: {e:#}");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };
        Self::new(keyframes_dir, fps_map)
    }

    pub fn fps_for(&self, video: &str) -> f64 {
        let vid = video.strip_suffix(".mp4").unwrap_or(video);
        self.fps_map.get(vid).copied().unwrap_or(DEFAULT_FPS)
    }

    /// Assemble a candidate from raw index attributes.
    ///
    /// The keyframe path is authoritative: when it has the
    /// `<batch>/<video>/<frame>.<ext>` shape, video and frame id are taken
    /// from it rather than from the stored attributes.
    pub fn candidate(
        &self,
        id: String,
        score: f32,
        video: &str,
        frame_id: i64,
        keyframe_path: &str,
    ) -> Candidate {
        let (video, frame_id) = identity_from_path(keyframe_path)
            .map(|(v, f)| (v, f.unwrap_or(frame_id)))
            .unwrap_or_else(|| (video.to_string(), frame_id));
        let fps = self.fps_for(&video);

        Candidate {
            id,
            score,
            video,
            frame_id,
            keyframe_path: keyframe_path.to_string(),
            fps,
            time_seconds: frame_id as f64 / fps,
        }
    }

    pub fn format(&self, candidate: &Candidate) -> FrameHit {
        FrameHit {
            id: candidate.id.clone(),
            score: candidate.score,
            video: candidate.video.clone(),
            frame_id: candidate.frame_id,
            keyframe_path: candidate.keyframe_path.clone(),
            thumbnail_path: candidate.keyframe_path.clone(),
            video_path: format!("{}.mp4", candidate.video),
            fps: candidate.fps,
            time_seconds: candidate.time_seconds,
            time: format_timestamp(candidate.time_seconds),
            kis_segment: kis_segment(candidate.frame_id, candidate.time_seconds, candidate.fps),
        }
    }

    /// Frames around `frame_id` in the same video, read from the keyframe
    /// directory. Each emitted frame is at least `stride` frames from the
    /// previously emitted one on its side. Returned in ascending order.
    pub async fn neighbors(&self, req: &NeighborRequest) -> Vec<NeighborFrame> {
        let Some(batch) = req.keyframe_path.split('/').next().filter(|b| !b.is_empty()) else {
            return Vec::new();
        };
        if !req.keyframe_path.contains('/') {
            return Vec::new();
        }

        // Video ids carry the batch prefix (L16_V021); directories do not.
        let dir_name = req
            .video
            .strip_prefix(batch)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(&req.video)
            .to_string();

        let mut video_dir = self.keyframes_dir.join(batch).join(&dir_name);
        if !tokio::fs::try_exists(&video_dir).await.unwrap_or(false) {
            tracing::warn!("Video directory not found: {}", video_dir.display());
            video_dir = self.keyframes_dir.join(batch).join(&req.video);
            if !tokio::fs::try_exists(&video_dir).await.unwrap_or(false) {
                return Vec::new();
            }
        }

        let frame_ids = match list_frame_ids(&video_dir).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Failed to list {}: {e:#}", video_dir.display());
                return Vec::new();
            }
        };

        let video = if req.video.contains('_') {
            req.video.clone()
        } else {
            format!("{batch}_{}", req.video)
        };
        let fps = self.fps_for(&video);
        let make = |cid: i64| {
            let time_seconds = cid as f64 / fps;
            let path = format!("{batch}/{dir_name}/{cid}.jpg");
            NeighborFrame {
                keyframe_path: path.clone(),
                thumbnail_path: path,
                frame_id: cid,
                video: video.clone(),
                time: format_timestamp(time_seconds),
                time_seconds,
                video_path: format!("{video}.mp4"),
                offset: cid - req.frame_id,
            }
        };

        let (before, after) = pick_neighbors(&frame_ids, req.frame_id, req.count, req.stride);
        before.into_iter().chain(after).map(make).collect()
    }
}

fn read_fps_map(path: &Path) -> Result<HashMap<String, f64>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).context("Failed to parse fps map")
}

/// `L01/V001/000123.jpg` -> (`L01_V001`, Some(123)).
fn identity_from_path(keyframe_path: &str) -> Option<(String, Option<i64>)> {
    let parts: Vec<&str> = keyframe_path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 3 {
        return None;
    }
    let batch = parts[parts.len() - 3];
    let video = parts[parts.len() - 2];
    let frame = Path::new(parts[parts.len() - 1])
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<i64>().ok());
    Some((format!("{batch}_{video}"), frame))
}

async fn list_frame_ids(video_dir: &Path) -> Result<Vec<i64>> {
    let mut entries = tokio::fs::read_dir(video_dir).await?;
    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(".jpg") {
            if let Ok(id) = stem.parse::<i64>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Split sorted `frame_ids` into up to `count` strided neighbors on each side
/// of `frame_id`, both halves in ascending order.
fn pick_neighbors(frame_ids: &[i64], frame_id: i64, count: usize, stride: i64) -> (Vec<i64>, Vec<i64>) {
    let curr = frame_ids.partition_point(|&f| f < frame_id);

    let mut before = Vec::new();
    let mut last = frame_id;
    for &cid in frame_ids[..curr].iter().rev() {
        if before.len() >= count {
            break;
        }
        if (last - cid).abs() >= stride {
            before.push(cid);
            last = cid;
        }
    }
    before.reverse();

    let start = if frame_ids.get(curr) == Some(&frame_id) {
        curr + 1
    } else {
        curr
    };
    let mut after = Vec::new();
    let mut last = frame_id;
    for &cid in &frame_ids[start..] {
        if after.len() >= count {
            break;
        }
        if (cid - last).abs() >= stride {
            after.push(cid);
            last = cid;
        }
    }

    (before, after)
}

/// `HH:MM:SS.mmm`
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0).floor();
    let minutes = ((seconds - hours * 3600.0) / 60.0).floor();
    let secs = seconds - hours * 3600.0 - minutes * 60.0;
    format!("{:02}:{:02}:{:06.3}", hours as u64, minutes as u64, secs)
}

pub fn kis_segment(frame_id: i64, time_seconds: f64, fps: f64) -> KisSegment {
    let start_seconds = (time_seconds - KIS_WINDOW_SECONDS).max(0.0);
    let end_seconds = time_seconds + KIS_WINDOW_SECONDS;
    KisSegment {
        start_ms: (start_seconds * 1000.0) as i64,
        end_ms: (end_seconds * 1000.0) as i64,
        start_seconds,
        end_seconds,
        start_frame: (frame_id as f64 - KIS_WINDOW_SECONDS * fps).max(0.0),
        end_frame: frame_id as f64 + KIS_WINDOW_SECONDS * fps,
    }
}
