use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::QueryInfo;

/// One audit record per cached query, newest first in the log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub query: QueryInfo,
}

/// Bounded, most-recent-first query history persisted as a JSON array.
pub struct HistoryLog {
    path: PathBuf,
    max_records: usize,
    // Serializes read-modify-write cycles on the file
    write_lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: PathBuf, max_records: usize) -> Self {
        Self {
            path,
            max_records,
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, query: QueryInfo) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut records = self.read_all()?;
        records.insert(
            0,
            HistoryRecord {
                timestamp: Utc::now(),
                query,
            },
        );
        records.truncate(self.max_records);

        let data = serde_json::to_string_pretty(&records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Up to `limit` most recent records.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut records = self.read_all()?;
        records.truncate(limit);
        Ok(records)
    }

    fn read_all(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        // A corrupt log restarts empty rather than blocking new records
        Ok(serde_json::from_str(&data).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(q: &str) -> QueryInfo {
        QueryInfo::TextTemporal {
            first_query: q.to_string(),
            first_query_en: q.to_string(),
            second_query: String::new(),
            second_query_en: String::new(),
            top_k: 10,
        }
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.json"), 2);

        log.append(info("a")).unwrap();
        log.append(info("b")).unwrap();
        log.append(info("c")).unwrap();

        let records = log.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query, info("c"));
        assert_eq!(records[1].query, info("b"));
    }

    #[test]
    fn test_corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let log = HistoryLog::new(path, 10);
        log.append(info("a")).unwrap();
        assert_eq!(log.recent(10).unwrap().len(), 1);
    }
}
