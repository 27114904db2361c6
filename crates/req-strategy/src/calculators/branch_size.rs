//! Branch-size reference calculator (C15): total line changes on the current
//! branch against its base, with stacked-PR-aware base detection.
//!
//! Ported near 1:1 from the Python original's `branch_size_calculator.py`,
//! with every `git` subcall routed through [`crate::git_exec::run_git`] for
//! the 3s timeout the original's `subprocess.run(timeout=3)` provides.

use crate::calculator::{CalcResult, Calculator};
use crate::git_exec::run_git;
use std::path::Path;
use std::sync::OnceLock;

fn insertions_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(\d+) insertion").unwrap())
}

fn deletions_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(\d+) deletion").unwrap())
}

#[derive(Debug, Clone, Copy, Default)]
struct Shortstat {
    ins: u64,
    del: u64,
}

pub struct BranchSizeCalculator;

impl Calculator for BranchSizeCalculator {
    fn calculate(&self, project_dir: &Path, branch: &str) -> Option<CalcResult> {
        if branch == "main" || branch == "master" {
            return None;
        }
        if is_detached_head(branch) {
            return None;
        }

        let base_branch = find_base_branch(branch, project_dir)?;

        let committed = diff_shortstat(project_dir, Some(&format!("{base_branch}...HEAD")));
        let staged = diff_shortstat(project_dir, Some("--cached"));
        let mut unstaged = diff_shortstat(project_dir, None);
        unstaged.ins += count_untracked_lines(project_dir);

        let total = (committed.ins + committed.del + staged.ins + staged.del + unstaged.ins + unstaged.del) as f64;
        let summary = format_summary(committed, staged, unstaged);

        let mut extra = serde_json::Map::new();
        extra.insert("committed".to_string(), shortstat_json(committed));
        extra.insert("staged".to_string(), shortstat_json(staged));
        extra.insert("unstaged".to_string(), shortstat_json(unstaged));
        extra.insert("base_branch".to_string(), serde_json::Value::String(base_branch));

        Some(CalcResult { value: total, summary, extra })
    }
}

fn is_detached_head(branch: &str) -> bool {
    branch.len() == 40 && branch.chars().all(|c| c.is_ascii_hexdigit())
}

fn branch_exists(project_dir: &Path, branch: &str) -> bool {
    run_git(&["rev-parse", "--verify", branch], project_dir).success
}

fn find_base_branch(branch: &str, project_dir: &Path) -> Option<String> {
    if let Some(parent) = find_parent_branch(branch, project_dir) {
        return Some(parent);
    }
    for candidate in ["origin/main", "origin/master", "main", "master"] {
        if branch_exists(project_dir, candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Stacked-PR support: the candidate `feature/*`/`fix/*` branch with the
/// fewest commits between its merge-base and the current branch wins.
fn find_parent_branch(branch: &str, project_dir: &Path) -> Option<String> {
    let out = run_git(&["branch"], project_dir);
    if !out.success {
        return None;
    }

    let candidates: Vec<String> = out
        .stdout
        .lines()
        .map(|l| l.trim().trim_start_matches("* ").trim().to_string())
        .filter(|b| !b.is_empty() && (b.starts_with("feature/") || b.starts_with("fix/")) && b != branch)
        .collect();

    let mut best: Option<(String, u64)> = None;
    for candidate in candidates {
        let mb = run_git(&["merge-base", branch, &candidate], project_dir);
        if !mb.success {
            continue;
        }
        let count_out = run_git(&["rev-list", "--count", &format!("{}..{branch}", mb.stdout)], project_dir);
        if !count_out.success {
            continue;
        }
        let Ok(count) = count_out.stdout.parse::<u64>() else { continue };
        if best.as_ref().map(|(_, c)| count < *c).unwrap_or(true) {
            best = Some((candidate, count));
        }
    }
    best.map(|(b, _)| b)
}

fn diff_shortstat(project_dir: &Path, ref_arg: Option<&str>) -> Shortstat {
    let mut args = vec!["diff", "--shortstat"];
    if let Some(r) = ref_arg {
        args.push(r);
    }
    let out = run_git(&args, project_dir);
    if !out.success {
        return Shortstat::default();
    }
    parse_shortstat(&out.stdout)
}

fn parse_shortstat(output: &str) -> Shortstat {
    let ins = insertions_re().captures(output).and_then(|c| c[1].parse().ok()).unwrap_or(0);
    let del = deletions_re().captures(output).and_then(|c| c[1].parse().ok()).unwrap_or(0);
    Shortstat { ins, del }
}

fn count_untracked_lines(project_dir: &Path) -> u64 {
    let out = run_git(&["ls-files", "--others", "--exclude-standard"], project_dir);
    if !out.success {
        return 0;
    }
    out.stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|f| {
            std::fs::read_to_string(project_dir.join(f))
                .map(|contents| contents.lines().count() as u64)
                .unwrap_or(0)
        })
        .sum()
}

fn shortstat_json(s: Shortstat) -> serde_json::Value {
    serde_json::json!({"ins": s.ins, "del": s.del})
}

fn format_summary(committed: Shortstat, staged: Shortstat, unstaged: Shortstat) -> String {
    let mut parts = Vec::new();
    if committed.ins > 0 || committed.del > 0 {
        parts.push(format!("committed: {}+/{}-", committed.ins, committed.del));
    }
    if staged.ins > 0 || staged.del > 0 {
        parts.push(format!("staged: {}+/{}-", staged.ins, staged.del));
    }
    if unstaged.ins > 0 || unstaged.del > 0 {
        parts.push(format!("unstaged: {}+/{}-", unstaged.ins, unstaged.del));
    }
    if parts.is_empty() { "no changes".to_string() } else { parts.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join("a.txt"), "one\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "init"]);
        git(dir, &["branch", "-m", "main"]);
    }

    #[test]
    fn protected_branch_is_skipped() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        assert!(BranchSizeCalculator.calculate(dir.path(), "main").is_none());
    }

    #[test]
    fn detached_head_hash_is_skipped() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let hash = "a".repeat(40);
        assert!(BranchSizeCalculator.calculate(dir.path(), &hash).is_none());
    }

    #[test]
    fn feature_branch_against_main_counts_changes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        git(dir.path(), &["checkout", "-q", "-b", "feature/x"]);
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "more"]);

        let result = BranchSizeCalculator.calculate(dir.path(), "feature/x").unwrap();
        assert!(result.value > 0.0);
        assert_eq!(result.extra.get("base_branch").and_then(|v| v.as_str()), Some("main"));
    }

    #[test]
    fn parses_shortstat_with_only_insertions() {
        let s = parse_shortstat(" 1 file changed, 5 insertions(+)");
        assert_eq!(s.ins, 5);
        assert_eq!(s.del, 0);
    }

    #[test]
    fn parses_shortstat_with_both() {
        let s = parse_shortstat(" 2 files changed, 10 insertions(+), 3 deletions(-)");
        assert_eq!(s.ins, 10);
        assert_eq!(s.del, 3);
    }
}
