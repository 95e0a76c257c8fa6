//! Two-tier query result cache, plus the flat-file memo tables in [`memo`].
//!
//! Memory tier: a capacity-bounded map under an `RwLock`, evicting the oldest
//! tenth of its entries on overflow. Disk tier: one JSON file per key under
//! the queries directory, never deleted but ignored once older than the TTL.
//! Disk failures are logged and degrade to a miss or a skipped write.

pub mod history;
pub mod memo;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CacheConfig;
use crate::models::{QueryInfo, QueryPayload, TimeGap};
use history::{HistoryLog, HistoryRecord};

/// Content hash of the normalized query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash each part after normalization; parts are length-delimited so
    /// `["a|b", "c"]` and `["a", "b|c"]` never collide.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            let normalized = normalize_text(part.as_ref());
            hasher.update(&(normalized.len() as u64).to_le_bytes());
            hasher.update(normalized.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn text(first_query: &str, second_query: &str, top_k: usize) -> Self {
        Self::from_parts(["text", first_query, second_query, &top_k.to_string()])
    }

    pub fn sequential(
        queries: &[String],
        top_k: usize,
        require_all_steps: bool,
        constraints: &[Option<TimeGap>],
    ) -> Self {
        let constraints = serde_json::to_string(constraints).unwrap_or_default();
        let mut parts = vec!["sequential".to_string(), queries.len().to_string()];
        parts.extend(queries.iter().cloned());
        parts.push(top_k.to_string());
        parts.push(require_all_steps.to_string());
        parts.push(constraints);
        Self::from_parts(parts)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// On-disk and in-memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub query_info: QueryInfo,
    pub results: QueryPayload,
}

pub struct ResultCache {
    memory: RwLock<HashMap<CacheKey, CacheEntry>>,
    entries_dir: PathBuf,
    history: HistoryLog,
    ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn open(entries_dir: &Path, history_path: &Path, config: &CacheConfig) -> Result<Self> {
        std::fs::create_dir_all(entries_dir)
            .with_context(|| format!("Failed to create {}", entries_dir.display()))?;

        Ok(Self {
            memory: RwLock::new(HashMap::new()),
            entries_dir: entries_dir.to_path_buf(),
            history: HistoryLog::new(history_path.to_path_buf(), config.history_limit),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
        })
    }

    /// Override the TTL (tests use sub-second values).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn get(&self, key: &CacheKey) -> Option<QueryPayload> {
        if let Some(entry) = self.memory.read().get(key) {
            if self.is_fresh(entry.timestamp) {
                return Some(entry.results.clone());
            }
        }

        let entry = self.read_disk(key)?;
        if !self.is_fresh(entry.timestamp) {
            return None;
        }
        tracing::info!("Persistent cache hit: {}", key.as_str());
        let results = entry.results.clone();
        self.insert_memory(key.clone(), entry);
        Some(results)
    }

    /// Write-through to both tiers and record the query in the history log.
    pub fn put(&self, key: &CacheKey, results: QueryPayload, query_info: QueryInfo) {
        let entry = CacheEntry {
            timestamp: Utc::now(),
            query_info: query_info.clone(),
            results,
        };

        if let Err(e) = self.write_disk(key, &entry) {
            tracing::warn!("Failed to save cache entry to disk: {e:#}");
        }
        self.insert_memory(key.clone(), entry);

        if let Err(e) = self.history.append(query_info) {
            tracing::warn!("Failed to log history: {e:#}");
        }
    }

    /// Entries currently held in memory.
    pub fn len(&self) -> usize {
        self.memory.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.history.recent(limit).unwrap_or_else(|e| {
            tracing::warn!("Failed to read history: {e:#}");
            Vec::new()
        })
    }

    fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        // Negative ages (clock moved backwards) count as fresh
        Utc::now()
            .signed_duration_since(timestamp)
            .to_std()
            .map_or(true, |age| age < self.ttl)
    }

    fn insert_memory(&self, key: CacheKey, entry: CacheEntry) {
        let mut memory = self.memory.write();
        memory.insert(key, entry);

        if memory.len() > self.max_entries {
            let evict = (self.max_entries / 10).max(1);
            let mut by_age: Vec<(DateTime<Utc>, CacheKey)> = memory
                .iter()
                .map(|(k, e)| (e.timestamp, k.clone()))
                .collect();
            by_age.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, k) in by_age.into_iter().take(evict) {
                memory.remove(&k);
            }
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.entries_dir.join(format!("{}.json", key.as_str()))
    }

    fn read_disk(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }
        let parsed = std::fs::read_to_string(&path)
            .context("Failed to read cache file")
            .and_then(|data| serde_json::from_str(&data).context("Failed to parse cache file"));
        match parsed {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Failed to load cache from disk ({}): {e:#}", path.display());
                None
            }
        }
    }

    fn write_disk(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(key);
        let data = serde_json::to_string_pretty(entry)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
