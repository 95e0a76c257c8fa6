use anyhow::Context;
use futures_util::future::{join_all, try_join, try_join_all};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::cache::history::HistoryRecord;
use crate::cache::memo::{EmbeddingCache, TranslationCache};
use crate::cache::{CacheKey, ResultCache};
use crate::config::Config;
use crate::error::QueryError;
use crate::frames::FrameCatalog;
use crate::models::{
    Candidate, FrameHit, NeighborFrame, NeighborRequest, QueryInfo, QueryPayload,
    SequentialHit, SequentialQueryRequest, SequentialResponse,
};
use crate::search::diversity::DiversityFilter;
use crate::search::rerank::Reranker;
use crate::search::sequential::rank_paths;
use crate::search::temporal::score_temporal_pairs;
use crate::translate::dictionary::Dictionary;
use crate::translate::KeywordAnchorEngine;
use crate::upstream::embeddings::{EmbeddingService, HttpEmbeddingClient};
use crate::upstream::index::{into_candidates, MilvusClient, VectorIndex};
use crate::upstream::translate::{HttpTranslator, PassthroughTranslator, TranslationBackend};

/// Minimum depth kept from a single-query search before diversity/truncation.
const SINGLE_QUERY_MIN_DEPTH: usize = 1000;

/// External services the pipeline calls.
pub struct Upstream {
    pub embeddings: Arc<dyn EmbeddingService>,
    pub index: Arc<dyn VectorIndex>,
    pub translator: Arc<dyn TranslationBackend>,
}

/// Query orchestrator: translation, cache, retrieval, scoring and formatting.
pub struct QueryService {
    config: Config,
    translator: KeywordAnchorEngine,
    embeddings: Arc<dyn EmbeddingService>,
    text_embeddings: EmbeddingCache,
    index: Arc<dyn VectorIndex>,
    cache: ResultCache,
    catalog: Arc<FrameCatalog>,
    reranker: Reranker,
    diversity: DiversityFilter,
    upstream_permits: Arc<Semaphore>,
}

impl QueryService {
    pub fn new(config: &Config, upstream: Upstream, dictionary: Dictionary) -> anyhow::Result<Self> {
        let catalog = Arc::new(FrameCatalog::load(
            &config.keyframes_dir,
            config.fps_map_path.as_deref(),
        ));
        let translation_cache =
            TranslationCache::open(config.translations_path(), config.translation.max_entries);
        let translator = KeywordAnchorEngine::new(
            dictionary,
            upstream.translator,
            translation_cache,
            &config.translation,
        );
        let cache = ResultCache::open(&config.query_cache_dir(), &config.history_path(), &config.cache)?;
        let text_embeddings = EmbeddingCache::open(
            config.text_embeddings_path(),
            config.cache.embedding_max_entries,
        );
        let reranker = Reranker::new(
            upstream.embeddings.clone(),
            config.keyframes_dir.clone(),
            config.rerank.clone(),
            config.max_workers,
        );

        Ok(Self {
            config: config.clone(),
            translator,
            embeddings: upstream.embeddings,
            text_embeddings,
            index: upstream.index,
            cache,
            catalog,
            reranker,
            diversity: DiversityFilter::from(&config.diversity),
            upstream_permits: Arc::new(Semaphore::new(config.max_workers.max(1))),
        })
    }

    /// Wire up the HTTP clients described by `config`.
    pub fn from_config(config: &Config, client: reqwest::Client) -> anyhow::Result<Self> {
        let translator: Arc<dyn TranslationBackend> = match &config.translation.base_url {
            Some(url) => Arc::new(HttpTranslator::new(client.clone(), url, &config.translation)),
            None => {
                tracing::info!("No translation service configured, queries pass through");
                Arc::new(PassthroughTranslator)
            }
        };

        let dictionary = match Dictionary::load(config.dictionary_path.as_deref()) {
            Ok(dict) => dict,
            Err(e) => {
                tracing::warn!("Dictionary unavailable, using built-in set: {e:#}");
                Dictionary::builtin()?
            }
        };

        let upstream = Upstream {
            embeddings: Arc::new(HttpEmbeddingClient::new(client.clone(), config.embedding.clone())),
            index: Arc::new(MilvusClient::new(client, config.index.clone())),
            translator,
        };
        Self::new(config, upstream, dictionary)
    }

    /// Text search, optionally "first event, then next event".
    pub async fn text_query(
        &self,
        first_query: &str,
        next_query: &str,
        top_k: usize,
    ) -> Result<Vec<FrameHit>, QueryError> {
        let start = Instant::now();
        if first_query.trim().is_empty() {
            return Err(QueryError::InvalidQuery("first_query is required".into()));
        }
        if top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be positive".into()));
        }

        let has_next = !next_query.trim().is_empty();
        let (first_en, next_en) = tokio::join!(self.translator.process_query(first_query), async {
            if has_next {
                self.translator.process_query(next_query).await
            } else {
                String::new()
            }
        });
        if first_en != first_query {
            tracing::info!("Translated (1): '{first_query}' -> '{first_en}'");
        }
        if has_next && next_en != next_query {
            tracing::info!("Translated (2): '{next_query}' -> '{next_en}'");
        }

        let key = CacheKey::text(&first_en, &next_en, top_k);
        if let Some(QueryPayload::Frames(hits)) = self.cache.get(&key) {
            tracing::info!(
                "Cache hit for '{first_en}' in {:.4}s",
                start.elapsed().as_secs_f64()
            );
            return Ok(hits);
        }

        let t_search = Instant::now();
        let limit = self.config.index.search_limit;
        let (query_embedding, mut results) = if has_next {
            let ((first_vec, first_hits), (_, next_hits)) = try_join(
                self.encode_and_search(&first_en, limit),
                self.encode_and_search(&next_en, limit),
            )
            .await?;
            let scored = score_temporal_pairs(
                first_hits,
                &next_hits,
                self.config.temporal_window_frames,
                self.config.temporal_result_cap,
            );
            (first_vec, scored)
        } else {
            let (first_vec, mut first_hits) = self.encode_and_search(&first_en, limit).await?;
            first_hits.truncate(top_k.max(SINGLE_QUERY_MIN_DEPTH));
            (first_vec, first_hits)
        };
        tracing::info!(
            "Encode + search took {:.4}s ({} candidates)",
            t_search.elapsed().as_secs_f64(),
            results.len()
        );

        let t_div = Instant::now();
        if self.config.diversity.enabled && !results.is_empty() {
            results = self.diversity.apply(results, top_k);
        }
        results.truncate(top_k);
        tracing::info!("Diversity filtering took {:.4}s", t_div.elapsed().as_secs_f64());

        if self.config.rerank.enabled && !results.is_empty() {
            let t_rerank = Instant::now();
            results = self
                .reranker
                .rerank(&query_embedding, results, top_k)
                .await
                .context("Rerank failed")?;
            tracing::info!("Reranking took {:.4}s", t_rerank.elapsed().as_secs_f64());
        }

        let hits: Vec<FrameHit> = results.iter().map(|c| self.catalog.format(c)).collect();

        let info = QueryInfo::TextTemporal {
            first_query: first_query.to_string(),
            first_query_en: first_en,
            second_query: next_query.to_string(),
            second_query_en: next_en,
            top_k,
        };
        self.cache.put(&key, QueryPayload::Frames(hits.clone()), info);

        tracing::info!(
            "Text query finished in {:.4}s with {} results",
            start.elapsed().as_secs_f64(),
            hits.len()
        );
        Ok(hits)
    }

    /// N-step "a, then b, then c" search.
    pub async fn sequential_query(
        &self,
        req: &SequentialQueryRequest,
    ) -> Result<SequentialResponse, QueryError> {
        let start = Instant::now();
        if req.queries.is_empty() {
            return Err(QueryError::InvalidQuery("At least one query is required".into()));
        }
        if let Some(i) = req.queries.iter().position(|q| q.trim().is_empty()) {
            return Err(QueryError::InvalidQuery(format!("Query {i} is empty")));
        }
        if req.top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be positive".into()));
        }

        let translated: Vec<String> =
            join_all(req.queries.iter().map(|q| self.translator.process_query(q))).await;
        tracing::info!("Sequential: {:?} -> {:?}", req.queries, translated);

        let constraints = req.time_gap_constraints.clone().unwrap_or_default();
        let key = CacheKey::sequential(&translated, req.top_k, req.require_all_steps, &constraints);
        if let Some(QueryPayload::Sequential(resp)) = self.cache.get(&key) {
            tracing::info!("Cache hit for sequential query");
            return Ok(resp);
        }

        // Steps sharing a text share one encode + search
        let mut unique: Vec<&str> = Vec::new();
        for q in &translated {
            if !unique.contains(&q.as_str()) {
                unique.push(q);
            }
        }
        let limit = self.config.index.sequential_search_limit;
        let searched: Vec<Vec<Candidate>> = try_join_all(
            unique
                .iter()
                .map(|q| async move { self.encode_and_search(q, limit).await.map(|(_, hits)| hits) }),
        )
        .await?;
        let step_results: Vec<Vec<Candidate>> = translated
            .iter()
            .map(|q| {
                unique
                    .iter()
                    .position(|u| *u == q.as_str())
                    .map(|i| searched[i].clone())
                    .unwrap_or_default()
            })
            .collect();

        let paths = rank_paths(&step_results, &constraints, req.require_all_steps, req.top_k);
        let results: Vec<SequentialHit> = paths
            .into_iter()
            .map(|p| SequentialHit {
                frame: self.catalog.format(&p.anchor),
                matched_steps: p.matched_steps,
                step_frames: p.step_frames,
                completeness: p.completeness,
                coherence: p.coherence,
                similarity: p.similarity,
                sequential_score: p.score,
            })
            .collect();

        let resp = SequentialResponse {
            total_results: results.len(),
            results,
            num_steps: req.queries.len(),
            queries: translated.clone(),
            execution_time: start.elapsed().as_secs_f64(),
        };

        let info = QueryInfo::Sequential {
            queries: req.queries.clone(),
            queries_en: translated,
            top_k: req.top_k,
            require_all_steps: req.require_all_steps,
            time_gap_constraints: constraints,
        };
        self.cache.put(&key, QueryPayload::Sequential(resp.clone()), info);

        tracing::info!(
            "Sequential query ({} steps) finished in {:.4}s with {} results",
            resp.num_steps,
            resp.execution_time,
            resp.total_results
        );
        Ok(resp)
    }

    pub async fn neighbors(&self, req: &NeighborRequest) -> Vec<NeighborFrame> {
        self.catalog.neighbors(req).await
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.cache.history(limit)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Text embedding, memoized by exact text across requests and restarts.
    async fn encode_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if let Some(vector) = self.text_embeddings.get(text) {
            tracing::debug!("Embedding cache hit for '{text}'");
            return Ok(vector);
        }
        let vector = self
            .embeddings
            .encode_text(text)
            .await
            .with_context(|| format!("Failed to encode '{text}'"))?;
        self.text_embeddings.insert(text, vector.clone());
        Ok(vector)
    }

    /// Encode `text` and fetch its nearest keyframes, holding one upstream permit.
    async fn encode_and_search(
        &self,
        text: &str,
        limit: usize,
    ) -> anyhow::Result<(Vec<f32>, Vec<Candidate>)> {
        let _permit = self
            .upstream_permits
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Upstream semaphore closed"))?;

        let vector = self.encode_text(text).await?;
        let hits = self
            .index
            .search(&vector, limit, None)
            .await
            .context("Vector search failed")?;
        Ok((vector, into_candidates(hits, &self.catalog)))
    }
}
