//! Query translation with keyword anchoring.
//!
//! Machine translation of short Vietnamese search queries tends to drop or
//! paraphrase the visual terms that matter most for retrieval (colors,
//! vehicles, named places). The engine translates the query as a whole, then
//! appends the curated English term for every dictionary keyword found in
//! the source whose translation is missing from the output.

pub mod anchors;
pub mod dictionary;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::memo::TranslationCache;
use crate::config::TranslationConfig;
use crate::upstream::translate::TranslationBackend;
use dictionary::Dictionary;

pub struct KeywordAnchorEngine {
    dictionary: Dictionary,
    backend: Arc<dyn TranslationBackend>,
    cache: TranslationCache,
    timeout: Duration,
    source_lang: String,
    target_lang: String,
    density_threshold: f64,
}

impl KeywordAnchorEngine {
    pub fn new(
        dictionary: Dictionary,
        backend: Arc<dyn TranslationBackend>,
        cache: TranslationCache,
        config: &TranslationConfig,
    ) -> Self {
        tracing::info!(
            "Keyword anchor engine ready: {} exact phrases, {} keywords",
            dictionary.exact_len(),
            dictionary.keywords().len()
        );
        Self {
            dictionary,
            backend,
            cache,
            timeout: Duration::from_secs(config.timeout_secs),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            density_threshold: config.density_threshold,
        }
    }

    /// Translate `query` into the retrieval language.
    ///
    /// Blank queries and queries that already look untranslatable (too few
    /// Vietnamese-only characters) come back unchanged and are not cached.
    pub async fn process_query(&self, query: &str) -> String {
        if query.trim().is_empty() {
            return query.to_string();
        }

        if let Some(hit) = self.cache.get(query) {
            return hit;
        }

        if anchors::vietnamese_density(query) <= self.density_threshold {
            return query.to_string();
        }

        let result = self.translate_smart(query).await;
        self.cache.insert(query, result.clone());
        result
    }

    /// Exact phrase lookup, else machine translation augmented with the
    /// anchors the translation lost.
    pub async fn translate_smart(&self, query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        if let Some(exact) = self.dictionary.exact(&normalized) {
            tracing::info!("Exact match: '{query}' -> '{exact}'");
            return exact.to_string();
        }

        let translated = self.translate_direct(query).await;
        let found = anchors::find_anchors(&query.to_lowercase(), self.dictionary.keywords());
        let missing = anchors::missing_anchors(&found, &translated);

        if missing.is_empty() {
            tracing::debug!("Direct translation used for '{query}'");
        } else {
            tracing::info!(
                "Augmented '{translated}' with {} anchors ({} matched)",
                missing.len(),
                found.len()
            );
        }
        anchors::merge(&translated, &missing)
    }

    /// Backend translation bounded by the configured timeout; any failure
    /// yields the original text.
    async fn translate_direct(&self, query: &str) -> String {
        let call = self
            .backend
            .translate(query, &self.source_lang, &self.target_lang);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => query.to_string(),
            Ok(Err(e)) => {
                tracing::warn!("Translation failed, using original query: {e:#}");
                query.to_string()
            }
            Err(_) => {
                tracing::warn!("Translation timed out after {:?}, using original query", self.timeout);
                query.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::translate::PassthroughTranslator;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTranslator {
        output: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationBackend for FixedTranslator {
        async fn translate(&self, _text: &str, _s: &str, _t: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    struct SlowTranslator;

    #[async_trait]
    impl TranslationBackend for SlowTranslator {
        async fn translate(&self, _text: &str, _s: &str, _t: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl TranslationBackend for FailingTranslator {
        async fn translate(&self, _text: &str, _s: &str, _t: &str) -> anyhow::Result<String> {
            anyhow::bail!("service unavailable")
        }
    }

    fn dictionary() -> Dictionary {
        let mut exact = HashMap::new();
        exact.insert("xe buýt".to_string(), "bus".to_string());
        let mut keywords = HashMap::new();
        keywords.insert("xanh lá".to_string(), "green".to_string());
        keywords.insert("màu xanh lá".to_string(), "green".to_string());
        keywords.insert("cháy".to_string(), "fire".to_string());
        Dictionary::new(exact, keywords)
    }

    fn engine(backend: Arc<dyn TranslationBackend>) -> KeywordAnchorEngine {
        let config = TranslationConfig {
            timeout_secs: 1,
            ..TranslationConfig::default()
        };
        KeywordAnchorEngine::new(dictionary(), backend, TranslationCache::in_memory(100), &config)
    }

    fn fixed(output: &str) -> Arc<FixedTranslator> {
        Arc::new(FixedTranslator {
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_nested_keyword_emits_single_anchor() {
        let engine = engine(fixed("car with leaves"));
        let out = engine.process_query("xe màu xanh lá").await;
        assert_eq!(out, "car with leaves, green");
    }

    #[tokio::test]
    async fn test_anchor_skipped_when_translation_has_it() {
        let engine = engine(fixed("Green car on fire"));
        let out = engine.process_query("xe màu xanh lá cháy").await;
        assert_eq!(out, "Green car on fire");
    }

    #[tokio::test]
    async fn test_exact_match_bypasses_backend() {
        let backend = fixed("should not be used");
        let engine = engine(backend.clone());
        assert_eq!(engine.process_query("  Xe Buýt ").await, "bus");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_english_query_passes_through_uncached() {
        let backend = fixed("unused");
        let engine = engine(backend.clone());
        assert_eq!(engine.process_query("a red car").await, "a red car");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(engine.cache.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_unchanged() {
        let engine = engine(Arc::new(PassthroughTranslator));
        assert_eq!(engine.process_query("   ").await, "   ");
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let backend = fixed("fire");
        let engine = engine(backend.clone());
        engine.process_query("đám cháy").await;
        engine.process_query("đám cháy").await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_original() {
        let engine = engine(Arc::new(FailingTranslator));
        assert_eq!(engine.process_query("đám cháy").await, "đám cháy, fire");
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_original() {
        let engine = engine(Arc::new(SlowTranslator));
        assert_eq!(engine.process_query("đám cháy").await, "đám cháy, fire");
    }
}
