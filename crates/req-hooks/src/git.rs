//! Git context resolution for hooks. Ported from `git_utils.py`'s
//! `is_git_repo`/`get_current_branch`, reusing the timeout-bounded
//! subprocess runner already built for calculators.

use req_strategy::git_exec::run_git;
use std::path::Path;

pub fn is_git_repo(project_dir: &Path) -> bool {
    run_git(&["rev-parse", "--git-dir"], project_dir).success
}

/// `None` for a non-repo, detached HEAD, or any git failure.
pub fn get_current_branch(project_dir: &Path) -> Option<String> {
    let out = run_git(&["symbolic-ref", "--short", "HEAD"], project_dir);
    if out.success && !out.stdout.is_empty() { Some(out.stdout) } else { None }
}

/// Project root: `CLAUDE_PROJECT_DIR` env override, else the current
/// working directory — matches `check-requirements.py`'s
/// `os.environ.get('CLAUDE_PROJECT_DIR', os.getcwd())`, which is the simpler
/// resolution the hooks actually use (not a `.git`-walking search).
pub fn resolve_project_root(cwd_hint: Option<&str>) -> Option<String> {
    if let Ok(dir) = std::env::var("CLAUDE_PROJECT_DIR") {
        if !dir.is_empty() {
            return Some(dir);
        }
    }
    if let Some(cwd) = cwd_hint {
        if !cwd.is_empty() {
            return Some(cwd.to_string());
        }
    }
    std::env::current_dir().ok().map(|p| p.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    #[test]
    fn non_repo_is_not_a_git_repo() {
        let dir = tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
        assert!(get_current_branch(dir.path()).is_none());
    }

    #[test]
    fn repo_reports_current_branch() {
        let dir = tempdir().unwrap();
        let git = |args: &[&str]| assert!(Command::new("git").args(args).current_dir(dir.path()).status().unwrap().success());
        git(&["init", "-q", "-b", "main"]);
        git(&["config", "user.email", "t@example.com"]);
        git(&["config", "user.name", "T"]);
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        git(&["add", "."]);
        git(&["commit", "-q", "-m", "init"]);

        assert!(is_git_repo(dir.path()));
        assert_eq!(get_current_branch(dir.path()), Some("main".to_string()));
    }
}
