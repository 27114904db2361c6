//! Calculation cache (C4): a short-TTL cache for expensive per-branch
//! calculator results, kept separate from requirement state since it's pure
//! performance optimization with its own lifecycle.
//!
//! Grounded on the Python original's `calculation_cache.py`: user-uid-scoped
//! temp file, plain (non-atomic) writes, fail-silent on every error path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Entry {
    timestamp: i64,
    data: serde_json::Value,
}

type CacheFile = HashMap<String, Entry>;

pub struct CalculationCache {
    path: PathBuf,
}

impl CalculationCache {
    pub fn new() -> Self {
        Self::new_in(&std::env::temp_dir())
    }

    pub fn new_in(dir: &Path) -> Self {
        let uid = unsafe { libc::getuid() };
        Self { path: dir.join(format!("claude-req-calc-cache-{uid}.json")) }
    }

    fn load(&self) -> CacheFile {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn store(&self, cache: &CacheFile) {
        if let Ok(json) = serde_json::to_string_pretty(cache) {
            if let Err(e) = std::fs::write(&self.path, json) {
                tracing::debug!(path = %self.path.display(), error = %e, "calculation cache write failed, ignoring");
            }
        }
    }

    /// Fresh cached value if present and within `ttl_secs`, else `None`.
    pub fn get(&self, cache_key: &str, ttl_secs: i64) -> Option<serde_json::Value> {
        let cache = self.load();
        let entry = cache.get(cache_key)?;
        let age = chrono::Utc::now().timestamp() - entry.timestamp;
        if age < ttl_secs { Some(entry.data.clone()) } else { None }
    }

    pub fn set(&self, cache_key: &str, data: serde_json::Value) {
        let mut cache = self.load();
        cache.insert(cache_key.to_string(), Entry { timestamp: chrono::Utc::now().timestamp(), data });
        self.store(&cache);
    }

    /// Clear one key, or the whole cache file when `cache_key` is `None`.
    pub fn clear(&self, cache_key: Option<&str>) {
        match cache_key {
            None => {
                let _ = std::fs::remove_file(&self.path);
            }
            Some(key) => {
                let mut cache = self.load();
                if cache.remove(key).is_some() {
                    self.store(&cache);
                }
            }
        }
    }
}

impl Default for CalculationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn miss_when_absent() {
        let dir = tempdir().unwrap();
        let cache = CalculationCache::new_in(dir.path());
        assert!(cache.get("k", 60).is_none());
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let dir = tempdir().unwrap();
        let cache = CalculationCache::new_in(dir.path());
        cache.set("k", serde_json::json!({"lines": 42}));
        assert_eq!(cache.get("k", 60), Some(serde_json::json!({"lines": 42})));
        assert!(cache.get("k", 0).is_none());
    }

    #[test]
    fn clear_one_key_leaves_others() {
        let dir = tempdir().unwrap();
        let cache = CalculationCache::new_in(dir.path());
        cache.set("a", serde_json::json!(1));
        cache.set("b", serde_json::json!(2));
        cache.clear(Some("a"));
        assert!(cache.get("a", 60).is_none());
        assert_eq!(cache.get("b", 60), Some(serde_json::json!(2)));
    }

    #[test]
    fn clear_all_removes_file() {
        let dir = tempdir().unwrap();
        let cache = CalculationCache::new_in(dir.path());
        cache.set("a", serde_json::json!(1));
        cache.clear(None);
        assert!(cache.get("a", 60).is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let cache = CalculationCache::new_in(dir.path());
        std::fs::write(&cache.path, b"not json").unwrap();
        assert!(cache.get("a", 60).is_none());
    }
}
