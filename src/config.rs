use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where caches, history and translation data are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Root of the extracted keyframes (`<batch>/<video>/<frame>.jpg`)
    pub keyframes_dir: PathBuf,
    /// Optional JSON map of video id -> fps
    pub fps_map_path: Option<PathBuf>,
    /// Optional JSON dictionary overriding the built-in one
    pub dictionary_path: Option<PathBuf>,
    /// Maximum concurrent upstream calls and image loads
    pub max_workers: usize,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub translation: TranslationConfig,
    pub cache: CacheConfig,
    pub diversity: DiversityConfig,
    pub rerank: RerankConfig,
    /// Frame horizon for "first event, then second event" pairs
    pub temporal_window_frames: i64,
    /// Maximum candidates kept after temporal pair scoring
    pub temporal_result_cap: usize,
}

/// Text/image embedding service (CLIP-style encoder behind HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Milvus collection holding one vector per keyframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub database: String,
    pub collection: String,
    pub vector_field: String,
    /// Candidates fetched per text query
    pub search_limit: usize,
    /// Candidates fetched per step of a sequential query
    pub sequential_search_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// LibreTranslate-compatible endpoint. If None, queries pass through untranslated.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Minimum share of Vietnamese-only characters before a query is translated
    pub density_threshold: f64,
    /// Maximum entries kept in the persisted translation map
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Memory-tier capacity; the oldest 10% are evicted on overflow
    pub max_entries: usize,
    /// Audit records kept in history.json
    pub history_limit: usize,
    /// Text embeddings kept in text_embeddings.json
    pub embedding_max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    pub enabled: bool,
    pub min_gap_frames: i64,
    pub max_per_video: usize,
    /// Result count for text requests that omit `top_k`
    pub max_results: usize,
    /// Extra per-video allowance used when backfilling
    pub backfill_slack: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Requested depth; defaults to 3 x top_k when unset
    pub depth: Option<usize>,
    pub min_depth: usize,
    pub max_depth: usize,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            keyframes_dir: PathBuf::from("./data/keyframes"),
            fps_map_path: None,
            dictionary_path: None,
            max_workers: 4,
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            translation: TranslationConfig::default(),
            cache: CacheConfig::default(),
            diversity: DiversityConfig::default(),
            rerank: RerankConfig::default(),
            temporal_window_frames: 1500,
            temporal_result_cap: 1000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            model: "ViT-H-14-378-quickgelu".to_string(),
            api_key: None,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:19530".to_string(),
            token: None,
            database: "default".to_string(),
            collection: "keyframes".to_string(),
            vector_field: "vector".to_string(),
            search_limit: 3000,
            sequential_search_limit: 1000,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            source_lang: "vi".to_string(),
            target_lang: "en".to_string(),
            timeout_secs: 2,
            density_threshold: 0.05,
            max_entries: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 1000,
            history_limit: 1000,
            embedding_max_entries: 1000,
        }
    }
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_gap_frames: 50,
            max_per_video: 5,
            max_results: 100,
            backfill_slack: 5,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: None,
            min_depth: 50,
            max_depth: 500,
            batch_size: 8,
        }
    }
}

/// Overwrite `target` with the parsed value of `key`, keeping the default
/// when the variable is missing or malformed.
fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        match val.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring unparseable {key}={val}"),
        }
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(val) = std::env::var(key) {
        *target = val;
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FRAME_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        env_string("FRAME_SEARCH_BIND_ADDR", &mut config.bind_addr);
        if let Ok(dir) = std::env::var("FRAME_SEARCH_KEYFRAMES_DIR") {
            config.keyframes_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_optional("FRAME_SEARCH_FPS_MAP") {
            config.fps_map_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_optional("FRAME_SEARCH_DICTIONARY") {
            config.dictionary_path = Some(PathBuf::from(path));
        }
        env_parse("FRAME_SEARCH_MAX_WORKERS", &mut config.max_workers);

        // Embedding service
        env_string("EMBEDDING_BASE_URL", &mut config.embedding.base_url);
        env_string("EMBEDDING_MODEL", &mut config.embedding.model);
        if let Some(key) = env_optional("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }

        // Vector index
        env_string("MILVUS_URL", &mut config.index.base_url);
        if let Some(token) = env_optional("MILVUS_TOKEN") {
            config.index.token = Some(token);
        }
        env_string("MILVUS_DATABASE", &mut config.index.database);
        env_string("MILVUS_COLLECTION", &mut config.index.collection);
        env_parse("MILVUS_SEARCH_LIMIT", &mut config.index.search_limit);
        env_parse(
            "SEQUENTIAL_SEARCH_LIMIT",
            &mut config.index.sequential_search_limit,
        );

        // Translation
        if let Some(url) = env_optional("TRANSLATE_BASE_URL") {
            config.translation.base_url = Some(url);
        }
        if let Some(key) = env_optional("TRANSLATE_API_KEY") {
            config.translation.api_key = Some(key);
        }
        env_parse("TRANSLATE_TIMEOUT_SECS", &mut config.translation.timeout_secs);

        // Result cache
        env_parse("CACHE_TTL_SECS", &mut config.cache.ttl_secs);
        env_parse("CACHE_MAX_ENTRIES", &mut config.cache.max_entries);
        env_parse(
            "EMBEDDING_CACHE_MAX_ENTRIES",
            &mut config.cache.embedding_max_entries,
        );

        // Diversity filter
        env_parse("DIVERSITY_ENABLED", &mut config.diversity.enabled);
        env_parse("DIVERSITY_MIN_GAP_FRAMES", &mut config.diversity.min_gap_frames);
        env_parse("DIVERSITY_MAX_PER_VIDEO", &mut config.diversity.max_per_video);
        env_parse("DIVERSITY_MAX_RESULTS", &mut config.diversity.max_results);
        env_parse("DIVERSITY_BACKFILL_SLACK", &mut config.diversity.backfill_slack);

        // Rerank
        env_parse("RERANK_ENABLED", &mut config.rerank.enabled);
        if let Ok(val) = std::env::var("RERANK_DEPTH") {
            if let Ok(v) = val.parse() {
                config.rerank.depth = Some(v);
            }
        }
        env_parse("RERANK_MIN_DEPTH", &mut config.rerank.min_depth);
        env_parse("RERANK_MAX_DEPTH", &mut config.rerank.max_depth);
        env_parse("RERANK_BATCH_SIZE", &mut config.rerank.batch_size);

        env_parse("TEMPORAL_WINDOW_FRAMES", &mut config.temporal_window_frames);

        config
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn query_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("queries")
    }

    pub fn translations_path(&self) -> PathBuf {
        self.cache_dir().join("translations.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.cache_dir().join("history.json")
    }

    pub fn text_embeddings_path(&self) -> PathBuf {
        self.cache_dir().join("text_embeddings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_live_under_cache_dir() {
        let config = Config::default();
        assert_eq!(config.query_cache_dir(), PathBuf::from("./data/cache/queries"));
        assert_eq!(
            config.translations_path(),
            PathBuf::from("./data/cache/translations.json")
        );
        assert_eq!(config.history_path(), PathBuf::from("./data/cache/history.json"));
        assert_eq!(
            config.text_embeddings_path(),
            PathBuf::from("./data/cache/text_embeddings.json")
        );
    }

    #[test]
    fn test_defaults_match_tuned_constants() {
        let config = Config::default();
        assert_eq!(config.temporal_window_frames, 1500);
        assert_eq!(config.rerank.min_depth, 50);
        assert_eq!(config.rerank.max_depth, 500);
        assert_eq!(config.diversity.backfill_slack, 5);
        assert_eq!(config.cache.max_entries, 1000);
    }
}
