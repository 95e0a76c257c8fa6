use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Joint text/image encoder (CLIP-style): both modalities land in the same
/// vector space as the keyframe index.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per image, in input order.
    async fn encode_images(&self, images: &[Vec<u8>]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct TextEmbedRequest<'a> {
    model: &'a str,
    texts: Vec<&'a str>,
}

#[derive(Serialize)]
struct ImageEmbedRequest<'a> {
    model: &'a str,
    /// Base64-encoded image bytes
    images: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(client: reqwest::Client, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));

        let mut req = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .context("Failed to call embedding API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API returned {status}: {body}");
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(body.embeddings)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let req = TextEmbedRequest {
            model: &self.config.model,
            texts: vec![text],
        };
        self.post("/v1/embed/text", &req)
            .await?
            .into_iter()
            .next()
            .context("No embedding returned")
    }

    async fn encode_images(&self, images: &[Vec<u8>]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let req = ImageEmbedRequest {
            model: &self.config.model,
            images: images.iter().map(|bytes| STANDARD.encode(bytes)).collect(),
        };
        let embeddings = self.post("/v1/embed/image", &req).await?;

        if embeddings.len() != images.len() {
            anyhow::bail!(
                "Embedding API returned {} vectors for {} images",
                embeddings.len(),
                images.len()
            );
        }
        Ok(embeddings)
    }
}
