use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Raw query -> augmented translation.
pub type TranslationCache = MemoCache<String>;

/// Translated query text -> text embedding.
pub type EmbeddingCache = MemoCache<Vec<f32>>;

/// FIFO-bounded memo table persisted as one flat JSON object that is
/// rewritten on every insert.
pub struct MemoCache<V> {
    inner: Mutex<Entries<V>>,
    path: Option<PathBuf>,
    max_entries: usize,
}

struct Entries<V> {
    map: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

impl<V> MemoCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Memory-only cache.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Entries::default()),
            path: None,
            max_entries: max_entries.max(1),
        }
    }

    /// Open the persisted map at `path`. A missing or corrupt file starts empty.
    pub fn open(path: PathBuf, max_entries: usize) -> Self {
        let mut entries = Entries::default();
        match read_map(&path) {
            Ok(Some(map)) => {
                tracing::info!("Loaded {} cached entries from {}", map.len(), path.display());
                // The flat map has no insertion order; rebuild one from sorted keys
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                entries.order = keys.into_iter().collect();
                entries.map = map;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load {}: {e:#}", path.display()),
        }

        let max_entries = max_entries.max(1);
        entries.trim(max_entries);
        Self {
            inner: Mutex::new(entries),
            path: Some(path),
            max_entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().map.get(key).cloned()
    }

    /// Insert and persist. The file is rewritten while the lock is held so
    /// concurrent inserts never interleave their writes.
    pub fn insert(&self, key: &str, value: V) {
        let mut entries = self.inner.lock();
        if entries.map.insert(key.to_string(), value).is_none() {
            entries.order.push_back(key.to_string());
        }
        entries.trim(self.max_entries);

        if let Some(path) = &self.path {
            if let Err(e) = write_map(path, &entries.map) {
                tracing::warn!("Failed to save {}: {e:#}", path.display());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Entries<V> {
    fn trim(&mut self, max_entries: usize) {
        while self.map.len() > max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

fn read_map<V: DeserializeOwned>(path: &Path) -> Result<Option<HashMap<String, V>>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let map = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(map))
}

fn write_map<V: Serialize>(path: &Path, map: &HashMap<String, V>) -> Result<()> {
    let data = serde_json::to_string(map)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_eviction() {
        let cache = TranslationCache::in_memory(2);
        cache.insert("a", "A".into());
        cache.insert("b", "B".into());
        cache.insert("c", "C".into());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").as_deref(), Some("C"));
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translations.json");

        let cache = TranslationCache::open(path.clone(), 10);
        cache.insert("xe buýt", "bus".into());

        let reopened = TranslationCache::open(path, 10);
        assert_eq!(reopened.get("xe buýt").as_deref(), Some("bus"));
    }

    #[test]
    fn test_embeddings_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text_embeddings.json");

        let cache = EmbeddingCache::open(path.clone(), 10);
        cache.insert("a red car", vec![0.25, -0.5, 1.0]);

        let reopened = EmbeddingCache::open(path, 10);
        assert_eq!(reopened.get("a red car"), Some(vec![0.25, -0.5, 1.0]));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translations.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let cache = TranslationCache::open(path, 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_leave_a_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translations.json");
        let cache = Arc::new(TranslationCache::open(path.clone(), 1000));

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        cache.insert(&format!("q{t}-{i}"), format!("t{t}-{i}"));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let reopened = TranslationCache::open(path, 1000);
        assert_eq!(reopened.len(), 160);
        assert_eq!(reopened.get("q7-19").as_deref(), Some("t7-19"));
    }
}
