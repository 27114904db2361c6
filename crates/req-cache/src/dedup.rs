//! Message dedup cache (C5): suppresses repeated identical blocking messages
//! when a tool fires several parallel calls within a short window.
//!
//! Grounded on `message_dedup_cache.py`: SHA-256 fingerprint (first 8 hex
//! chars), default 5s TTL, atomic temp-file-then-rename writes, corrupt-file
//! auto-recovery, and a 60s (12x default TTL) expiry sweep on every write.
//! Fail-open: any error means "show the message".

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SWEEP_MAX_AGE_SECS: i64 = 60;
const DEFAULT_TTL_SECS: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    timestamp: i64,
    message_hash: String,
}

type CacheFile = HashMap<String, Entry>;

pub struct MessageDedupCache {
    path: PathBuf,
}

impl MessageDedupCache {
    pub fn new() -> Self {
        Self::new_in(&std::env::temp_dir())
    }

    pub fn new_in(dir: &Path) -> Self {
        let uid = unsafe { libc::getuid() };
        Self { path: dir.join(format!("claude-message-dedup-{uid}.json")) }
    }

    fn hash_message(message: &str) -> String {
        let digest = Sha256::digest(message.as_bytes());
        format!("{digest:x}")[..8].to_string()
    }

    fn load(&self) -> Option<CacheFile> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(cache) => Some(cache),
            Err(_) => {
                // Corrupted cache: delete and recover to an empty one.
                let _ = std::fs::remove_file(&self.path);
                Some(HashMap::new())
            }
        }
    }

    fn entry(&self, cache: &CacheFile, key: &str, ttl_secs: i64) -> Option<String> {
        let entry = cache.get(key)?;
        let age = chrono::Utc::now().timestamp() - entry.timestamp;
        if age < ttl_secs { Some(entry.message_hash.clone()) } else { None }
    }

    fn sweep(cache: &mut CacheFile) {
        let now = chrono::Utc::now().timestamp();
        cache.retain(|_, e| now - e.timestamp <= SWEEP_MAX_AGE_SECS);
    }

    fn write_atomic(&self, cache: &CacheFile) {
        let Some(parent) = self.path.parent() else { return };
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
        let Ok(json) = serde_json::to_string_pretty(cache) else { return };
        if let Ok(mut tmp) = tempfile::NamedTempFile::new_in(parent) {
            use std::io::Write;
            if tmp.write_all(json.as_bytes()).is_ok() {
                let _ = tmp.persist(&self.path);
            }
        }
    }

    /// `true` if this exact message hasn't been shown under `cache_key`
    /// within `ttl_secs`. Any I/O error fails open (returns `true`).
    pub fn should_show_message(&self, cache_key: &str, message: &str, ttl_secs: i64) -> bool {
        let Some(mut cache) = self.load() else { return true };
        let hash = Self::hash_message(message);

        if let Some(cached_hash) = self.entry(&cache, cache_key, ttl_secs) {
            if cached_hash == hash {
                return false;
            }
        }

        cache.insert(cache_key.to_string(), Entry { timestamp: chrono::Utc::now().timestamp(), message_hash: hash });
        Self::sweep(&mut cache);
        self.write_atomic(&cache);
        true
    }

    /// Convenience wrapper using the default 5s TTL.
    pub fn should_show(&self, cache_key: &str, message: &str) -> bool {
        self.should_show_message(cache_key, message, DEFAULT_TTL_SECS)
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Default for MessageDedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_call_shows_message() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        assert!(cache.should_show_message("k", "hello", 5));
    }

    #[test]
    fn repeated_identical_message_within_ttl_is_suppressed() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        assert!(cache.should_show_message("k", "hello", 5));
        assert!(!cache.should_show_message("k", "hello", 5));
    }

    #[test]
    fn changed_message_is_shown_again() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        assert!(cache.should_show_message("k", "hello", 5));
        assert!(cache.should_show_message("k", "goodbye", 5));
    }

    #[test]
    fn expired_ttl_shows_again() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        assert!(cache.should_show_message("k", "hello", 0));
        assert!(cache.should_show_message("k", "hello", 0));
    }

    #[test]
    fn corrupt_cache_file_fails_open() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        std::fs::write(&cache.path, b"{ broken").unwrap();
        assert!(cache.should_show_message("k", "hello", 5));
    }

    #[test]
    fn clear_resets_state() {
        let dir = tempdir().unwrap();
        let cache = MessageDedupCache::new_in(dir.path());
        cache.should_show_message("k", "hello", 5);
        cache.clear();
        assert!(cache.should_show_message("k", "hello", 5));
    }
}
