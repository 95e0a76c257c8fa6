use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::config::RerankConfig;
use crate::models::Candidate;
use crate::upstream::embeddings::EmbeddingService;

const JPEG_QUALITY: u8 = 95;

/// Re-scores the head of a ranked list by comparing the query embedding with
/// embeddings of the keyframe images themselves.
pub struct Reranker {
    embeddings: Arc<dyn EmbeddingService>,
    keyframes_dir: PathBuf,
    config: RerankConfig,
    load_permits: Arc<Semaphore>,
}

impl Reranker {
    pub fn new(
        embeddings: Arc<dyn EmbeddingService>,
        keyframes_dir: PathBuf,
        config: RerankConfig,
        max_workers: usize,
    ) -> Self {
        Self {
            embeddings,
            keyframes_dir,
            config,
            load_permits: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Prefix length to rerank: the configured depth (or `3 * top_k`) clamped
    /// to `[min_depth, max_depth]`.
    pub fn depth_for(&self, top_k: usize) -> usize {
        let requested = self.config.depth.unwrap_or(top_k.saturating_mul(3));
        let max = self.config.max_depth.max(self.config.min_depth);
        requested.clamp(self.config.min_depth, max)
    }

    /// Replace scores of the reranked prefix with image similarity.
    ///
    /// Candidates whose keyframe is not on disk are dropped from the result;
    /// images that cannot be read or decoded score 0.
    /// Embedding service failures propagate.
    pub async fn rerank(
        &self,
        query_embedding: &[f32],
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let depth = self.depth_for(top_k);
        let mut resolved: Vec<(Candidate, PathBuf)> = Vec::new();
        for c in candidates.into_iter().take(depth) {
            if c.keyframe_path.is_empty() {
                continue;
            }
            let path = self.keyframes_dir.join(&c.keyframe_path);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                resolved.push((c, path));
            }
        }
        tracing::info!(
            "Starting rerank of {} candidates (max depth: {depth})",
            resolved.len()
        );

        let mut reranked = Vec::with_capacity(resolved.len());
        let batch_size = self.config.batch_size.max(1);
        let mut iter = resolved.into_iter().peekable();
        while iter.peek().is_some() {
            let batch: Vec<(Candidate, PathBuf)> = iter.by_ref().take(batch_size).collect();
            let paths: Vec<PathBuf> = batch.iter().map(|(_, p)| p.clone()).collect();
            let scores = self.score_batch(query_embedding, paths).await?;

            for ((mut c, _), score) in batch.into_iter().zip(scores) {
                c.score = score;
                reranked.push(c);
            }
        }

        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(top_k);
        Ok(reranked)
    }

    async fn score_batch(&self, query_embedding: &[f32], paths: Vec<PathBuf>) -> Result<Vec<f32>> {
        let start = Instant::now();

        let loads = paths.into_iter().map(|path| {
            let permits = self.load_permits.clone();
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Error loading {}: {e}", path.display());
                        return None;
                    }
                };
                let decoded = tokio::task::spawn_blocking(move || normalize_image(&bytes))
                    .await
                    .ok()?;
                match decoded {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!("Cannot decode {}: {e}", path.display());
                        None
                    }
                }
            })
        });
        let images: Vec<Option<Vec<u8>>> = futures_util::future::join_all(loads)
            .await
            .into_iter()
            .map(|joined| joined.ok().flatten())
            .collect();
        let load_time = start.elapsed();

        let valid: Vec<Vec<u8>> = images.iter().flatten().cloned().collect();
        let mut vectors = if valid.is_empty() {
            Vec::new().into_iter()
        } else {
            self.embeddings.encode_images(&valid).await?.into_iter()
        };

        // Failed loads stand in as zero vectors, which score 0
        let scores = images
            .iter()
            .map(|img| match img {
                Some(_) => vectors
                    .next()
                    .map(|v| cosine_similarity(query_embedding, &v))
                    .unwrap_or(0.0),
                None => 0.0,
            })
            .collect::<Vec<f32>>();

        tracing::debug!(
            "Batch of {}: load={:.3}s total={:.3}s",
            images.len(),
            load_time.as_secs_f64(),
            start.elapsed().as_secs_f64()
        );
        Ok(scores)
    }
}

/// Decode any supported image and re-encode it as an RGB JPEG so the
/// embedding service only ever receives well-formed payloads.
fn normalize_image(bytes: &[u8]) -> image::ImageResult<Vec<u8>> {
    let rgb = image::load_from_memory(bytes)?.into_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes an image as `[gray_level, 1.0]` so tests can steer similarity
    /// through pixel values. Rejects payloads it cannot decode, like a real
    /// image encoder would.
    struct GrayEmbedder {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for GrayEmbedder {
        async fn encode_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn encode_images(&self, images: &[Vec<u8>]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            images
                .iter()
                .map(|bytes| -> anyhow::Result<Vec<f32>> {
                    let img = image::load_from_memory(bytes)
                        .map_err(|_| anyhow::anyhow!("cannot decode image"))?
                        .into_rgb8();
                    Ok(vec![img.get_pixel(0, 0)[0] as f32, 1.0])
                })
                .collect()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingService for FailingEmbedder {
        async fn encode_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("down")
        }

        async fn encode_images(&self, _images: &[Vec<u8>]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("down")
        }
    }

    fn cand(frame_id: i64, score: f32) -> Candidate {
        Candidate {
            id: frame_id.to_string(),
            score,
            video: "L01_V001".into(),
            frame_id,
            keyframe_path: format!("L01/V001/{frame_id}.jpg"),
            fps: 25.0,
            time_seconds: frame_id as f64 / 25.0,
        }
    }

    fn video_dir(dir: &std::path::Path) -> std::path::PathBuf {
        let video_dir = dir.join("L01").join("V001");
        std::fs::create_dir_all(&video_dir).unwrap();
        video_dir
    }

    fn write_jpeg(dir: &std::path::Path, frame_id: i64, gray: u8) {
        let img = RgbImage::from_pixel(16, 16, Rgb([gray, gray, gray]));
        img.save_with_format(
            video_dir(dir).join(format!("{frame_id}.jpg")),
            ImageFormat::Jpeg,
        )
        .unwrap();
    }

    fn config(batch_size: usize) -> RerankConfig {
        RerankConfig {
            enabled: true,
            depth: None,
            min_depth: 50,
            max_depth: 500,
            batch_size,
        }
    }

    fn gray_embedder() -> Arc<GrayEmbedder> {
        Arc::new(GrayEmbedder {
            batches: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_depth_clamped() {
        let r = Reranker::new(
            Arc::new(FailingEmbedder),
            PathBuf::from("/nonexistent"),
            config(8),
            2,
        );
        assert_eq!(r.depth_for(5), 50);
        assert_eq!(r.depth_for(100), 300);
        assert_eq!(r.depth_for(1000), 500);
    }

    #[test]
    fn test_normalize_image() {
        let mut png = Vec::new();
        RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]))
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let jpeg = normalize_image(&png).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        assert!(normalize_image(b"hello world").is_err());
        assert!(normalize_image(&[0xFF, 0xD8, 0xFF, 0xE0]).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_rerank_reorders_and_drops_missing() {
        let dir = tempfile::tempdir().unwrap();
        // Brighter frame -> closer to [1, 0] after normalization
        write_jpeg(dir.path(), 1, 2);
        write_jpeg(dir.path(), 2, 120);
        write_jpeg(dir.path(), 3, 30);

        let embedder = gray_embedder();
        let r = Reranker::new(embedder.clone(), dir.path().to_path_buf(), config(2), 2);

        let input = vec![cand(1, 0.9), cand(2, 0.8), cand(3, 0.7), cand(4, 0.6)];
        let out = r.rerank(&[1.0, 0.0], input, 10).await.unwrap();

        let ids: Vec<i64> = out.iter().map(|c| c.frame_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        // Three images in batches of two
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_image_scores_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), 1, 80);
        std::fs::write(video_dir(dir.path()).join("2.jpg"), b"not an image").unwrap();

        let r = Reranker::new(gray_embedder(), dir.path().to_path_buf(), config(8), 2);

        let out = r
            .rerank(&[1.0, 0.0], vec![cand(2, 0.9), cand(1, 0.1)], 10)
            .await
            .unwrap();
        assert_eq!(out[0].frame_id, 1);
        assert_eq!(out[1].frame_id, 2);
        assert_eq!(out[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_truncated_jpeg_scores_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), 1, 80);
        // Valid JPEG header with no body
        std::fs::write(
            video_dir(dir.path()).join("2.jpg"),
            [0xFF, 0xD8, 0xFF, 0xE0],
        )
        .unwrap();

        let r = Reranker::new(gray_embedder(), dir.path().to_path_buf(), config(8), 2);

        let out = r
            .rerank(&[1.0, 0.0], vec![cand(2, 0.9), cand(1, 0.1)], 10)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].frame_id, 1);
        assert!(out[0].score > 0.9);
        assert_eq!(out[1].frame_id, 2);
        assert_eq!(out[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), 1, 5);
        let r = Reranker::new(Arc::new(FailingEmbedder), dir.path().to_path_buf(), config(8), 2);
        assert!(r.rerank(&[1.0, 0.0], vec![cand(1, 0.5)], 10).await.is_err());
    }
}
