//! Engine configuration (C17): this binary's own operational knobs — log
//! level/path, lock timeout, default cache TTLs. Distinct from, and not a
//! substitute for, the out-of-scope *policy* cascade in [`crate::document`].
//!
//! Uses a 4-tier `merge_with` override pattern: built-in default < global <
//! project < explicit runtime override.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

fn default_cache_ttl() -> i64 {
    60
}

fn default_dedup_ttl() -> i64 {
    5
}

/// Every field is optional so a layer can express "no opinion" and let a
/// lower-priority layer's value stand; [`EngineConfig::resolve`] applies the
/// built-in defaults at the end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cache_ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dedup_ttl: Option<i64>,
}

impl EngineConfigLayer {
    fn load_from_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(layer) => layer,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse engine config, ignoring");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read engine config, ignoring");
                Self::default()
            }
        }
    }

    /// Merge `other` into `self`, with `other` taking priority field-by-field.
    fn merge_with(&mut self, other: Self) {
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
        if other.lock_timeout_ms.is_some() {
            self.lock_timeout_ms = other.lock_timeout_ms;
        }
        if other.default_cache_ttl.is_some() {
            self.default_cache_ttl = other.default_cache_ttl;
        }
        if other.default_dedup_ttl.is_some() {
            self.default_dedup_ttl = other.default_dedup_ttl;
        }
    }
}

/// Resolved engine configuration, after all four layers have been merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub lock_timeout_ms: u64,
    pub default_cache_ttl: i64,
    pub default_dedup_ttl: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            default_cache_ttl: default_cache_ttl(),
            default_dedup_ttl: default_dedup_ttl(),
        }
    }
}

impl EngineConfig {
    /// Load the 4-tier cascade: built-in default < `global_path` <
    /// `project_path` < `runtime_override`.
    pub fn load(global_path: Option<&Path>, project_path: Option<&Path>, runtime_override: Option<EngineConfigLayer>) -> Self {
        let mut layer = EngineConfigLayer::default();

        if let Some(path) = global_path {
            layer.merge_with(EngineConfigLayer::load_from_file(path));
        }
        if let Some(path) = project_path {
            layer.merge_with(EngineConfigLayer::load_from_file(path));
        }
        if let Some(runtime) = runtime_override {
            layer.merge_with(runtime);
        }

        Self {
            log_level: layer.log_level.unwrap_or_else(default_log_level),
            log_file: layer.log_file,
            lock_timeout_ms: layer.lock_timeout_ms.unwrap_or_else(default_lock_timeout_ms),
            default_cache_ttl: layer.default_cache_ttl.unwrap_or_else(default_cache_ttl),
            default_dedup_ttl: layer.default_dedup_ttl.unwrap_or_else(default_dedup_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_layers_yields_built_in_defaults() {
        let cfg = EngineConfig::load(None, None, None);
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn project_overrides_global() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(&global, "log_level = \"warn\"\nlock_timeout_ms = 1000\n").unwrap();
        std::fs::write(&project, "log_level = \"debug\"\n").unwrap();

        let cfg = EngineConfig::load(Some(&global), Some(&project), None);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.lock_timeout_ms, 1000);
    }

    #[test]
    fn runtime_override_wins_over_everything() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project.toml");
        std::fs::write(&project, "log_level = \"debug\"\n").unwrap();

        let runtime = EngineConfigLayer { log_level: Some("trace".to_string()), ..Default::default() };
        let cfg = EngineConfig::load(None, Some(&project), Some(runtime));
        assert_eq!(cfg.log_level, "trace");
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let cfg = EngineConfig::load(Some(Path::new("/nonexistent/g.toml")), Some(Path::new("/nonexistent/p.toml")), None);
        assert_eq!(cfg, EngineConfig::default());
    }
}
