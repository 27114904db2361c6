//! Cross-session registry (C3): tracks live CLI sessions so the Stop/guard
//! strategies can see "who else is active right now".
//!
//! Grounded on the Python original's `session.py` (`~/.claude/sessions.json`,
//! shared/exclusive `flock`, `os.kill(pid, 0)` liveness check). Fail-open
//! throughout: every read/write failure is logged and treated as empty.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const REGISTRY_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Registry {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    sessions: HashMap<String, RegistryEntry>,
}

fn default_version() -> String {
    REGISTRY_VERSION.to_string()
}

impl Default for Registry {
    fn default() -> Self {
        Self { version: REGISTRY_VERSION.to_string(), sessions: HashMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    pid: i32,
    ppid: i32,
    project_dir: String,
    branch: String,
    started_at: i64,
    last_active: i64,
}

/// A session as seen from outside, with its id attached.
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    pub id: String,
    pub pid: i32,
    pub ppid: i32,
    pub project_dir: String,
    pub branch: String,
    pub started_at: i64,
    pub last_active: i64,
}

/// Whether a process with the given pid exists, via `kill(pid, 0)`.
fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 sends nothing, only checks existence/permission.
    unsafe { libc::kill(pid, 0) == 0 }
}

fn registry_path_in(home: &Path) -> PathBuf {
    home.join(".claude").join("sessions.json")
}

/// `~/.claude/sessions.json`, resolved via the platform home directory.
pub fn registry_path() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(registry_path_in(&home))
}

fn load_registry(path: &Path) -> Registry {
    req_lock::read_json_locked(path)
}

fn prune_dead(registry: &mut Registry) -> bool {
    let dead: Vec<String> = registry
        .sessions
        .iter()
        .filter(|(_, s)| !is_process_alive(s.ppid))
        .map(|(id, _)| id.clone())
        .collect();
    for id in &dead {
        registry.sessions.remove(id);
    }
    !dead.is_empty()
}

/// Record/refresh the current session's entry, pruning dead ones along the
/// way. Fail-open: any I/O error is logged, never propagated.
pub fn update_registry_in(path: &Path, session_id: &str, pid: i32, ppid: i32, project_dir: &str, branch: &str) {
    let mut registry = load_registry(path);
    prune_dead(&mut registry);

    let now = chrono::Utc::now().timestamp();
    registry
        .sessions
        .entry(session_id.to_string())
        .and_modify(|s| {
            s.project_dir = project_dir.to_string();
            s.branch = branch.to_string();
            s.last_active = now;
        })
        .or_insert(RegistryEntry {
            pid,
            ppid,
            project_dir: project_dir.to_string(),
            branch: branch.to_string(),
            started_at: now,
            last_active: now,
        });

    if let Err(e) = req_lock::write_json_locked(path, &registry) {
        tracing::warn!(error = %e, "could not update session registry");
    }
}

pub fn update_registry(session_id: &str, project_dir: &str, branch: &str) -> anyhow::Result<()> {
    let path = registry_path()?;
    update_registry_in(&path, session_id, std::process::id() as i32, unsafe { libc::getppid() }, project_dir, branch);
    Ok(())
}

/// All sessions whose `ppid` is alive, optionally filtered by project/branch.
pub fn get_active_sessions_in(
    path: &Path,
    project_dir: Option<&str>,
    branch: Option<&str>,
) -> Vec<RegisteredSession> {
    let registry = load_registry(path);
    registry
        .sessions
        .into_iter()
        .filter(|(_, s)| is_process_alive(s.ppid))
        .filter(|(_, s)| project_dir.is_none_or(|p| s.project_dir == p))
        .filter(|(_, s)| branch.is_none_or(|b| s.branch == b))
        .map(|(id, s)| RegisteredSession {
            id,
            pid: s.pid,
            ppid: s.ppid,
            project_dir: s.project_dir,
            branch: s.branch,
            started_at: s.started_at,
            last_active: s.last_active,
        })
        .collect()
}

pub fn get_active_sessions(project_dir: Option<&str>, branch: Option<&str>) -> anyhow::Result<Vec<RegisteredSession>> {
    Ok(get_active_sessions_in(&registry_path()?, project_dir, branch))
}

/// Remove dead-process entries; returns how many were removed.
pub fn cleanup_stale_sessions_in(path: &Path) -> usize {
    let mut registry = load_registry(path);
    let before = registry.sessions.len();
    if prune_dead(&mut registry) {
        if let Err(e) = req_lock::write_json_locked(path, &registry) {
            tracing::warn!(error = %e, "could not write pruned session registry");
            return 0;
        }
    }
    before - registry.sessions.len()
}

pub fn cleanup_stale_sessions() -> anyhow::Result<usize> {
    Ok(cleanup_stale_sessions_in(&registry_path()?))
}

/// Remove one session explicitly (used by the SessionEnd handler).
pub fn remove_session_in(path: &Path, session_id: &str) -> bool {
    let mut registry = load_registry(path);
    let removed = registry.sessions.remove(session_id).is_some();
    if removed {
        if let Err(e) = req_lock::write_json_locked(path, &registry) {
            tracing::warn!(error = %e, "could not write session registry after removal");
            return false;
        }
    }
    removed
}

pub fn remove_session(session_id: &str) -> anyhow::Result<bool> {
    Ok(remove_session_in(&registry_path()?, session_id))
}
