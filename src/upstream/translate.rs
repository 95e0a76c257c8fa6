use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TranslationConfig;

/// Machine translation backend.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Returns the input unchanged; used when no translation service is configured.
pub struct PassthroughTranslator;

#[async_trait]
impl TranslationBackend for PassthroughTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

// ─── LibreTranslate-compatible ───────────────────────────

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(client: reqwest::Client, base_url: &str, config: &TranslationConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TranslationBackend for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let url = format!("{}/translate", self.base_url);
        let req = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call translation API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Translation API returned {status}: {body}");
        }

        let body: TranslateResponse = resp
            .json()
            .await
            .context("Failed to parse translation response")?;

        Ok(body.translated_text)
    }
}
