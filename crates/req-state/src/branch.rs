//! Per-branch requirement state: load/save, satisfaction checks, and the
//! session/branch/permanent/single_use scope rules (spec C2).
//!
//! Grounded on the Python original's `state_storage.py` (file layout, atomic
//! write discipline, version-mismatch recovery) and `requirements.py` (the
//! `BranchRequirements` satisfaction/migration logic), ported to the explicit
//! `Result`-returning, no-panic style the rest of this workspace uses.

use chrono::Utc;
use req_core::{Scope, normalize_session_id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const STATE_VERSION: &str = "1.0";

/// One requirement's stored facts for a branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sessions: HashMap<String, SessionRecord>,
}

/// One session's satisfaction record for a requirement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Whether any strategy has dispatched for this requirement in this
    /// session yet. `branch`/`permanent` scope requirements are always
    /// triggered (see [`Scope::always_triggered`]); this field only matters
    /// for `session`/`single_use`.
    #[serde(default)]
    pub triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<i64>,
}

/// The on-disk document for one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchState {
    pub version: String,
    pub branch: String,
    pub project: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub requirements: HashMap<String, RequirementState>,
}

impl BranchState {
    fn empty(branch: &str, project_dir: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            version: STATE_VERSION.to_string(),
            branch: branch.to_string(),
            project: project_dir.to_string(),
            created_at: now,
            updated_at: now,
            requirements: HashMap::new(),
        }
    }
}

impl Default for BranchState {
    fn default() -> Self {
        Self::empty("", "")
    }
}

fn branch_to_filename(branch: &str) -> String {
    let safe: String = branch
        .replace('/', "-")
        .replace('\\', "-")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.json")
}

/// Resolve the git directory state should live under. Uses the repo's
/// *common* directory (`git rev-parse --git-common-dir`) rather than a bare
/// `.git`, so worktrees of the same repo share one state store instead of
/// each worktree's private `.git` getting its own — mirrors
/// `session_metrics.py`'s "In git worktrees, uses the COMMON git directory to
/// share across worktrees." Falls back to `<project_dir>/.git` on any
/// failure (not a repo, git missing, timeout): fail-open, never blocks.
fn resolve_git_dir(project_dir: &Path) -> PathBuf {
    match git_common_dir(project_dir) {
        Some(raw) => {
            let p = PathBuf::from(raw);
            if p.is_absolute() { p } else { project_dir.join(p) }
        }
        None => project_dir.join(".git"),
    }
}

/// `git rev-parse --git-common-dir`, bounded to 3s like the rest of this
/// workspace's git subcalls (see `req_strategy::git_exec::run_git`); kept
/// local rather than depending on `req-strategy`, which already depends on
/// `req-state`.
fn git_common_dir(project_dir: &Path) -> Option<String> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("git")
        .args(["rev-parse", "--git-common-dir"])
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let pid = child.id();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(std::time::Duration::from_secs(3)) {
        Ok(Ok(output)) if output.status.success() => {
            let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if s.is_empty() { None } else { Some(s) }
        }
        Ok(_) => None,
        Err(_) => {
            // SAFETY: pid is our own just-spawned child; SIGKILL on timeout only.
            unsafe { libc::kill(pid as i32, libc::SIGKILL) };
            None
        }
    }
}

fn state_dir(project_dir: &Path) -> PathBuf {
    resolve_git_dir(project_dir).join("requirements")
}

fn state_path(project_dir: &Path, branch: &str) -> PathBuf {
    state_dir(project_dir).join(branch_to_filename(branch))
}

fn load_state(project_dir: &Path, branch: &str) -> BranchState {
    let path = state_path(project_dir, branch);
    match req_lock::read_raw_locked(&path) {
        None => BranchState::empty(branch, &project_dir.to_string_lossy()),
        Some(contents) => match serde_json::from_str::<BranchState>(&contents) {
            Ok(state) if state.version == STATE_VERSION => state,
            Ok(_) => {
                tracing::warn!(branch, "state file has incompatible version, regenerating");
                BranchState::empty(branch, &project_dir.to_string_lossy())
            }
            Err(e) => {
                tracing::warn!(branch, error = %e, "state file is corrupt, regenerating");
                req_lock::quarantine_corrupt(&path);
                BranchState::empty(branch, &project_dir.to_string_lossy())
            }
        },
    }
}

fn save_state(project_dir: &Path, branch: &str, state: &mut BranchState) {
    state.updated_at = Utc::now().timestamp();
    let path = state_path(project_dir, branch);
    if let Err(e) = req_lock::write_json_locked(&path, state) {
        tracing::warn!(branch, error = %e, "could not save branch state");
    }
}

/// Requirement manager bound to one (branch, session, project) triple.
/// Mirrors `BranchRequirements` from the Python original.
pub struct BranchRequirements {
    branch: String,
    session_id: String,
    project_dir: PathBuf,
    state: BranchState,
}

impl BranchRequirements {
    pub fn load(project_dir: &Path, branch: &str, session_id: &str) -> Self {
        let session_id = normalize_session_id(session_id);
        let mut state = load_state(project_dir, branch);
        let migrated = migrate_session_keys(&mut state);
        let mut me = Self {
            branch: branch.to_string(),
            session_id,
            project_dir: project_dir.to_path_buf(),
            state,
        };
        if migrated {
            me.save();
        }
        me
    }

    fn save(&mut self) {
        save_state(&self.project_dir, &self.branch, &mut self.state);
    }

    fn req_mut(&mut self, req_name: &str) -> &mut RequirementState {
        self.state.requirements.entry(req_name.to_string()).or_default()
    }

    /// C2 `is_satisfied`: branch-level override first, then per-scope rules.
    pub fn is_satisfied(&self, req_name: &str, scope: Scope) -> bool {
        let now = Utc::now().timestamp();
        let Some(req) = self.state.requirements.get(req_name) else {
            return false;
        };

        if scope.is_session_like() && req.satisfied.unwrap_or(false) {
            let unexpired = req.expires_at.map(|exp| now <= exp).unwrap_or(true);
            if unexpired {
                return true;
            }
        }

        match scope {
            Scope::Session | Scope::SingleUse => {
                let Some(session) = req.sessions.get(&self.session_id) else {
                    return false;
                };
                if !session.satisfied {
                    return false;
                }
                match session.expires_at {
                    Some(exp) if now > exp => false,
                    _ => true,
                }
            }
            Scope::Branch => {
                if !req.satisfied.unwrap_or(false) {
                    return false;
                }
                match req.expires_at {
                    Some(exp) if now > exp => false,
                    _ => true,
                }
            }
            Scope::Permanent => req.satisfied.unwrap_or(false),
        }
    }

    /// C2 `satisfy`.
    pub fn satisfy(
        &mut self,
        req_name: &str,
        scope: Scope,
        method: &str,
        metadata: Option<serde_json::Value>,
        ttl: Option<i64>,
    ) {
        let now = Utc::now().timestamp();
        let session_id = self.session_id.clone();
        let req = self.req_mut(req_name);
        req.scope = Some(scope);

        if scope.is_session_like() {
            let session = req.sessions.entry(session_id).or_default();
            session.satisfied = true;
            session.satisfied_at = Some(now);
            session.satisfied_by = Some(method.to_string());
            session.metadata = metadata;
            session.expires_at = ttl.map(|t| now + t);
        } else {
            req.satisfied = Some(true);
            req.satisfied_at = Some(now);
            req.satisfied_by = Some(method.to_string());
            req.metadata = metadata;
            req.expires_at = if scope == Scope::Branch { ttl.map(|t| now + t) } else { None };
        }

        self.save();
    }

    /// C2 `clear`: remove the requirement entirely.
    pub fn clear(&mut self, req_name: &str) {
        if self.state.requirements.remove(req_name).is_some() {
            self.save();
        }
    }

    /// C2 `clear_single_use`: only clears the current session's record, and
    /// only if the requirement's stored scope is `single_use`.
    pub fn clear_single_use(&mut self, req_name: &str) -> bool {
        let session_id = self.session_id.clone();
        let cleared = match self.state.requirements.get_mut(req_name) {
            Some(req) if req.scope == Some(Scope::SingleUse) => req.sessions.remove(&session_id).is_some(),
            _ => false,
        };
        if cleared {
            self.save();
        }
        cleared
    }

    pub fn clear_all(&mut self) {
        self.state.requirements.clear();
        self.save();
    }

    /// C2's approval mechanism: TTL-bound, `satisfied_by="approval"`, always
    /// session-scoped.
    pub fn approve_for_session(&mut self, req_name: &str, ttl_secs: i64, metadata: Option<serde_json::Value>) {
        let now = Utc::now().timestamp();
        let session_id = self.session_id.clone();
        let req = self.req_mut(req_name);
        req.scope = Some(Scope::Session);
        let session = req.sessions.entry(session_id).or_default();
        session.satisfied = true;
        session.satisfied_at = Some(now);
        session.satisfied_by = Some("approval".to_string());
        session.expires_at = Some(now + ttl_secs);
        session.metadata = metadata;
        self.save();
    }

    /// Stricter than [`is_satisfied`](Self::is_satisfied): only true for an
    /// unexpired approval record, not any other satisfaction method.
    pub fn is_approved(&self, req_name: &str) -> bool {
        let Some(req) = self.state.requirements.get(req_name) else {
            return false;
        };
        let Some(session) = req.sessions.get(&self.session_id) else {
            return false;
        };
        if !session.satisfied || session.satisfied_by.as_deref() != Some("approval") {
            return false;
        }
        match session.expires_at {
            Some(exp) => Utc::now().timestamp() < exp,
            None => false,
        }
    }

    /// Mark that a strategy has dispatched for this requirement in this
    /// session. No-op for always-triggered scopes.
    pub fn mark_triggered(&mut self, req_name: &str, scope: Scope) {
        if scope.always_triggered() {
            return;
        }
        let now = Utc::now().timestamp();
        let session_id = self.session_id.clone();
        let req = self.req_mut(req_name);
        let session = req.sessions.entry(session_id).or_default();
        if !session.triggered {
            session.triggered = true;
            session.triggered_at = Some(now);
            self.save();
        }
    }

    /// Whether this requirement has ever been dispatched for the current
    /// session. `branch`/`permanent` are always triggered.
    pub fn is_triggered(&self, req_name: &str, scope: Scope) -> bool {
        if scope.always_triggered() {
            return true;
        }
        self.state
            .requirements
            .get(req_name)
            .and_then(|req| req.sessions.get(&self.session_id))
            .map(|s| s.triggered)
            .unwrap_or(false)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn requirement(&self, req_name: &str) -> Option<&RequirementState> {
        self.state.requirements.get(req_name)
    }

    pub fn requirements(&self) -> &HashMap<String, RequirementState> {
        &self.state.requirements
    }
}

/// One-time, idempotent migration of full-UUID session keys to the
/// normalized 8-char form. Returns whether anything changed.
fn migrate_session_keys(state: &mut BranchState) -> bool {
    let mut migrated = false;
    for req in state.requirements.values_mut() {
        if req.sessions.is_empty() {
            continue;
        }
        let old_keys: Vec<String> = req.sessions.keys().cloned().collect();
        for old_key in old_keys {
            let normalized = normalize_session_id(&old_key);
            if old_key == normalized {
                continue;
            }
            let old_record = req.sessions.remove(&old_key).expect("key just listed");
            match req.sessions.get(&normalized) {
                Some(existing) if existing.satisfied_at.unwrap_or(0) >= old_record.satisfied_at.unwrap_or(0) => {
                    // Existing normalized record is newer or tied; keep it.
                }
                _ => {
                    req.sessions.insert(normalized, old_record);
                }
            }
            migrated = true;
        }
    }
    migrated
}

/// List `(branch, path)` for every state file under the project, used by
/// the stale-branch cleanup operation.
pub fn list_all_states(project_dir: &Path) -> Vec<(String, PathBuf)> {
    let dir = state_dir(project_dir);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let branch = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<BranchState>(&s).ok())
            .map(|s| s.branch)
            .unwrap_or_else(|| path.file_stem().unwrap_or_default().to_string_lossy().to_string());
        out.push((branch, path));
    }
    out
}

/// Delete the state file for `branch`, if present.
pub fn delete_state(project_dir: &Path, branch: &str) {
    let path = state_path(project_dir, branch);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(branch, error = %e, "could not delete branch state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(dir: &Path) {
        std::fs::create_dir_all(dir.join(".git")).unwrap();
    }

    #[test]
    fn non_repo_falls_back_to_dot_git() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        assert_eq!(resolve_git_dir(dir.path()), dir.path().join(".git"));
    }

    #[test]
    fn worktree_state_is_shared_via_common_dir() {
        use std::process::Command;
        let main_repo = tempdir().unwrap();
        let git = |args: &[&str], dir: &Path| {
            assert!(Command::new("git").args(args).current_dir(dir).status().unwrap().success());
        };
        git(&["init", "-q"], main_repo.path());
        git(&["config", "user.email", "t@example.com"], main_repo.path());
        git(&["config", "user.name", "T"], main_repo.path());
        std::fs::write(main_repo.path().join("a.txt"), "one\n").unwrap();
        git(&["add", "."], main_repo.path());
        git(&["commit", "-q", "-m", "init"], main_repo.path());

        let worktree_dir = tempdir().unwrap();
        let worktree_path = worktree_dir.path().join("wt");
        git(&["branch", "feature/x"], main_repo.path());
        git(&["worktree", "add", "-q", worktree_path.to_str().unwrap(), "feature/x"], main_repo.path());

        let main_reqs = BranchRequirements::load(main_repo.path(), "master", "s1");
        drop(main_reqs);
        let mut wt_reqs = BranchRequirements::load(&worktree_path, "feature/x", "s1");
        wt_reqs.satisfy("commit_plan", Scope::Permanent, "cli", None, None);
        drop(wt_reqs);

        // State for the worktree's branch lands under the main repo's .git,
        // not a private one inside the worktree.
        assert!(!worktree_path.join(".git").is_dir());
        assert!(main_repo.path().join(".git/requirements/feature-x.json").exists());
    }

    #[test]
    fn session_scope_is_per_session() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        assert!(!a.is_satisfied("commit_plan", Scope::Session));
        a.satisfy("commit_plan", Scope::Session, "cli", None, None);
        assert!(a.is_satisfied("commit_plan", Scope::Session));

        let b = BranchRequirements::load(dir.path(), "feature/x", "session-2");
        assert!(!b.is_satisfied("commit_plan", Scope::Session));
    }

    #[test]
    fn branch_scope_persists_across_sessions() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("ticket", Scope::Branch, "cli", None, None);

        let b = BranchRequirements::load(dir.path(), "feature/x", "session-2");
        assert!(b.is_satisfied("ticket", Scope::Branch));
    }

    #[test]
    fn branch_override_satisfies_session_scope_too() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("ticket", Scope::Branch, "cli", None, None);

        let b = BranchRequirements::load(dir.path(), "feature/x", "session-2");
        assert!(b.is_satisfied("ticket", Scope::Session));
    }

    #[test]
    fn clear_removes_requirement() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("ticket", Scope::Branch, "cli", None, None);
        a.clear("ticket");
        assert!(!a.is_satisfied("ticket", Scope::Branch));
    }

    #[test]
    fn single_use_clears_only_current_session() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("review", Scope::SingleUse, "cli", None, None);
        assert!(a.clear_single_use("review"));
        assert!(!a.is_satisfied("review", Scope::SingleUse));
    }

    #[test]
    fn clear_single_use_is_noop_for_other_scopes() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("review", Scope::Session, "cli", None, None);
        assert!(!a.clear_single_use("review"));
        assert!(a.is_satisfied("review", Scope::Session));
    }

    #[test]
    fn approval_is_distinct_from_manual_satisfaction() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.satisfy("big_diff", Scope::Session, "cli", None, None);
        assert!(!a.is_approved("big_diff"));

        a.approve_for_session("big_diff", 3600, None);
        assert!(a.is_approved("big_diff"));
    }

    #[test]
    fn approval_expires() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        a.approve_for_session("big_diff", -10, None);
        assert!(!a.is_approved("big_diff"));
    }

    #[test]
    fn triggered_flag_tracks_first_dispatch() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let mut a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        assert!(!a.is_triggered("commit_plan", Scope::Session));
        a.mark_triggered("commit_plan", Scope::Session);
        assert!(a.is_triggered("commit_plan", Scope::Session));
    }

    #[test]
    fn branch_and_permanent_scopes_are_always_triggered() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let a = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        assert!(a.is_triggered("ticket", Scope::Branch));
        assert!(a.is_triggered("security_review", Scope::Permanent));
    }

    #[test]
    fn legacy_uuid_session_key_is_migrated_to_8_chars() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let path = state_path(dir.path(), "feature/x");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let legacy = serde_json::json!({
            "version": "1.0",
            "branch": "feature/x",
            "project": dir.path().to_string_lossy(),
            "created_at": 0,
            "updated_at": 0,
            "requirements": {
                "commit_plan": {
                    "scope": "session",
                    "sessions": {
                        "abcd1234-5678-90ab-cdef-000000000000": {
                            "satisfied": true,
                            "satisfied_at": 100,
                            "satisfied_by": "cli"
                        }
                    }
                }
            }
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&legacy).unwrap()).unwrap();

        let reqs = BranchRequirements::load(dir.path(), "feature/x", "abcd1234");
        assert!(reqs.is_satisfied("commit_plan", Scope::Session));
    }

    #[test]
    fn corrupt_version_regenerates_empty_state() {
        let dir = tempdir().unwrap();
        setup(dir.path());
        let path = state_path(dir.path(), "feature/x");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, br#"{"version":"0.9","branch":"feature/x","project":"x","created_at":0,"updated_at":0,"requirements":{}}"#).unwrap();

        let reqs = BranchRequirements::load(dir.path(), "feature/x", "session-1");
        assert!(!reqs.is_satisfied("anything", Scope::Branch));
    }
}
