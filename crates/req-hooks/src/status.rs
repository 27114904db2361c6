//! Status briefing (C12): the `SessionStart` context injection shown to the
//! assistant, at one of three densities. Ported from
//! `handle-session-start.py`'s compact/standard/rich formatters.

use req_policy::{GuardType, PolicyDocument, ReqType};
use req_state::BranchRequirements;
use req_strategy::StrategyContext;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    Compact,
    Standard,
    Rich,
}

/// Resolve the density for this `SessionStart`: an explicit `injection_mode`
/// config override wins; otherwise `source` drives `auto` selection
/// (`compact` source -> compact, `resume` -> standard, anything else ->
/// rich). An unknown override value logs a warning and falls back to
/// `standard`, matching the Python original's defensive default.
pub fn resolve_density(injection_mode: Option<&str>, source: Option<&str>) -> Density {
    match injection_mode {
        None | Some("auto") => match source {
            Some("compact") => Density::Compact,
            Some("resume") => Density::Standard,
            _ => Density::Rich,
        },
        Some("compact") => Density::Compact,
        Some("standard") => Density::Standard,
        Some("rich") => Density::Rich,
        Some(other) => {
            tracing::warn!(mode = other, "unknown injection_mode, falling back to standard");
            Density::Standard
        }
    }
}

struct ReqStatus<'a> {
    name: &'a str,
    satisfied: bool,
    guard_note: Option<String>,
    auto_resolve_skill: Option<&'a str>,
}

fn collect_statuses<'a>(
    policy: &'a PolicyDocument,
    reqs: &mut BranchRequirements,
    ctx: &StrategyContext,
) -> Vec<ReqStatus<'a>> {
    let mut out = Vec::new();
    for name in policy.all_requirements() {
        if !policy.is_requirement_enabled(name) {
            continue;
        }
        let (satisfied, guard_note) = if policy.req_type(name) == ReqType::Guard {
            let denial = req_strategy::strategies::guard::check(name, policy, reqs, None, ctx);
            (denial.is_none(), denial.is_none().then(|| guard_context_note(policy, name, &ctx.branch)).flatten())
        } else {
            (reqs.is_satisfied(name, policy.scope(name)), None)
        };
        let auto_resolve_skill =
            policy.attribute(name, "auto_resolve_skill").and_then(|v| v.as_str()).filter(|s| !s.is_empty());
        out.push(ReqStatus { name, satisfied, guard_note, auto_resolve_skill });
    }
    out
}

/// Extra parenthetical context shown next to a satisfied guard, e.g.
/// `✅ (not on protected branch)` / `✅ (no other sessions)`.
fn guard_context_note(policy: &PolicyDocument, name: &str, branch: &str) -> Option<String> {
    let view = policy.guard_config(name)?;
    match view.guard_type {
        GuardType::ProtectedBranch => {
            if view.protected_branches.iter().any(|b| b == branch) {
                Some("not on protected branch".to_string())
            } else {
                None
            }
        }
        GuardType::SingleSession => Some("no other sessions".to_string()),
    }
}

pub fn render(
    policy: &PolicyDocument,
    reqs: &mut BranchRequirements,
    branch: &str,
    ctx: &StrategyContext,
    density: Density,
    custom_header: Option<&str>,
) -> String {
    let statuses = collect_statuses(policy, reqs, ctx);
    let mut out = String::new();
    if let Some(header) = custom_header {
        let _ = writeln!(out, "{header}\n");
    }

    match density {
        Density::Compact => render_compact(&mut out, &statuses),
        Density::Standard => render_standard(&mut out, &statuses, branch),
        Density::Rich => render_rich(&mut out, &statuses, branch),
    }
    out
}

fn render_compact(out: &mut String, statuses: &[ReqStatus]) {
    let pending: Vec<&str> = statuses.iter().filter(|s| !s.satisfied).map(|s| s.name).collect();
    if pending.is_empty() {
        out.push_str("Requirements: all satisfied.\n");
    } else {
        let _ = writeln!(out, "Requirements pending: {}", pending.join(", "));
    }
}

fn render_standard(out: &mut String, statuses: &[ReqStatus], branch: &str) {
    let _ = writeln!(out, "## Requirements status (`{branch}`)\n");
    for s in statuses {
        let mark = if s.satisfied { "\u{2705}" } else { "\u{23f3}" };
        match (&s.guard_note, s.satisfied) {
            (Some(note), true) => {
                let _ = writeln!(out, "- {mark} `{}` ({note})", s.name);
            }
            _ => {
                let _ = writeln!(out, "- {mark} `{}`", s.name);
            }
        }
    }
    render_actions(out, statuses);
}

fn render_rich(out: &mut String, statuses: &[ReqStatus], branch: &str) {
    let _ = writeln!(out, "## Requirements status (`{branch}`)\n");
    let _ = writeln!(out, "| Requirement | Status | Notes |");
    let _ = writeln!(out, "|---|---|---|");
    for s in statuses {
        let mark = if s.satisfied { "\u{2705} satisfied" } else { "\u{23f3} pending" };
        let note = match (&s.guard_note, s.satisfied) {
            (Some(note), true) => note.as_str(),
            _ => "",
        };
        let _ = writeln!(out, "| `{}` | {mark} | {note} |", s.name);
    }
    out.push('\n');
    render_actions(out, statuses);
}

/// Actions to resolve pending requirements, skill-invocable ones
/// (`/skill-name`) grouped and listed before manual `req satisfy` commands.
fn render_actions(out: &mut String, statuses: &[ReqStatus]) {
    let pending: Vec<&ReqStatus> = statuses.iter().filter(|s| !s.satisfied).collect();
    if pending.is_empty() {
        return;
    }
    let (skill, manual): (Vec<_>, Vec<_>) = pending.into_iter().partition(|s| s.auto_resolve_skill.is_some());

    out.push_str("\n**Resolve with**:\n");
    for s in &skill {
        let _ = writeln!(out, "- `{}`: `/{}`", s.name, s.auto_resolve_skill.unwrap());
    }
    for s in &manual {
        let _ = writeln!(out, "- `{}`: `req satisfy {}`", s.name, s.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reqs(dir: &std::path::Path, branch: &str) -> BranchRequirements {
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        BranchRequirements::load(dir, branch, "session-1")
    }

    #[test]
    fn auto_mode_picks_compact_for_compact_source() {
        assert_eq!(resolve_density(None, Some("compact")), Density::Compact);
        assert_eq!(resolve_density(None, Some("resume")), Density::Standard);
        assert_eq!(resolve_density(None, Some("startup")), Density::Rich);
    }

    #[test]
    fn unknown_override_falls_back_to_standard() {
        assert_eq!(resolve_density(Some("bogus"), None), Density::Standard);
    }

    #[test]
    fn compact_lists_only_pending() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        let policy = PolicyDocument::from_json(r#"{"requirements": {"commit_plan": {}}}"#).unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        let out = render(&policy, &mut r, "feature/x", &ctx, Density::Compact, None);
        assert!(out.contains("commit_plan"));
    }

    #[test]
    fn standard_marks_satisfied_requirement() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        r.satisfy("commit_plan", req_core::Scope::Session, "cli", None, None);
        let policy = PolicyDocument::from_json(r#"{"requirements": {"commit_plan": {}}}"#).unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        let out = render(&policy, &mut r, "feature/x", &ctx, Density::Standard, None);
        assert!(out.contains("\u{2705}"));
        assert!(!out.contains("**Resolve with**"));
    }

    #[test]
    fn rich_adds_protected_branch_context_note() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        let policy =
            PolicyDocument::from_json(r#"{"requirements": {"no_main": {"type": "guard", "guard_type": "protected_branch"}}}"#)
                .unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        let out = render(&policy, &mut r, "feature/x", &ctx, Density::Rich, None);
        assert!(out.contains("not on protected branch"));
    }

    #[test]
    fn custom_header_is_prefixed() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        let policy = PolicyDocument::from_json("{}").unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        let out = render(&policy, &mut r, "feature/x", &ctx, Density::Compact, Some("# My Project"));
        assert!(out.starts_with("# My Project"));
    }
}
