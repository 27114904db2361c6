//! Guard requirement strategy (C9): boolean conditions (protected branch,
//! single active session) rather than manually-satisfied checklists.
//! Session-scoped `is_satisfied` doubles as the emergency-approval check
//! (`req approve`), matching `guard_strategy.py`.

use super::{Denial, dedup_denial, substitute_inline};
use crate::context::StrategyContext;
use req_cache::MessageDedupCache;
use req_core::{Scope, format_age};
use req_policy::{GuardType, PolicyDocument};
use req_state::BranchRequirements;
use std::collections::HashMap;

const DEDUP_TTL_SECS: i64 = 5;

pub fn check(
    req_name: &str,
    policy: &PolicyDocument,
    reqs: &mut BranchRequirements,
    dedup_cache: Option<&MessageDedupCache>,
    ctx: &StrategyContext,
) -> Option<Denial> {
    if reqs.is_satisfied(req_name, Scope::Session) {
        return None;
    }

    let Some(view) = policy.guard_config(req_name) else {
        return None;
    };

    match view.guard_type {
        GuardType::ProtectedBranch => check_protected_branch(req_name, policy, dedup_cache, ctx),
        GuardType::SingleSession => check_single_session(req_name, policy, dedup_cache, ctx),
    }
}

fn check_protected_branch(
    req_name: &str,
    policy: &PolicyDocument,
    dedup_cache: Option<&MessageDedupCache>,
    ctx: &StrategyContext,
) -> Option<Denial> {
    let view = policy.guard_config(req_name)?;
    if !view.protected_branches.iter().any(|b| b == &ctx.branch) {
        return None;
    }

    let auto_resolve_skill = policy
        .attribute(req_name, "auto_resolve_skill")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut substitutions = HashMap::new();
    substitutions.insert("req_name".to_string(), req_name.to_string());
    substitutions.insert("session_id".to_string(), ctx.session_id.clone());
    substitutions.insert("branch".to_string(), ctx.branch.clone());
    substitutions.insert("project_dir".to_string(), ctx.project_dir_str());
    substitutions.insert("auto_resolve_skill".to_string(), auto_resolve_skill.clone());

    let from_provider = ctx
        .message_provider
        .and_then(|p| p.messages(req_name, "guard", &substitutions))
        .filter(|bundle| !bundle.blocking_message.is_empty());

    let (message, short_message) = if let Some(bundle) = from_provider {
        (bundle.blocking_message, bundle.short_message)
    } else {
        let message = match view.message.filter(|m| !m.is_empty()) {
            Some(m) => substitute_inline(
                m,
                &[("branch", &ctx.branch), ("auto_resolve_skill", &auto_resolve_skill), ("session_id", &ctx.session_id)],
            ),
            None => protected_branch_fallback(req_name, &ctx.branch),
        };
        (message, format!("Guard `{req_name}` blocked (waiting...)"))
    };

    let cache_key = format!("{}:{}:{}:{}", ctx.project_dir_str(), ctx.branch, ctx.session_id, req_name);
    Some(dedup_denial(dedup_cache, &cache_key, message, short_message, DEDUP_TTL_SECS))
}

fn protected_branch_fallback(req_name: &str, branch: &str) -> String {
    [
        format!("## Blocked: {req_name}"),
        String::new(),
        format!("Cannot edit files on protected branch `{branch}`."),
        String::new(),
        "**Actions**:".to_string(),
        "1. Create feature branch: `git checkout -b feature/your-feature-name`".to_string(),
        format!("2. Emergency override: `req approve {req_name}`"),
    ]
    .join("\n")
}

fn check_single_session(
    req_name: &str,
    policy: &PolicyDocument,
    dedup_cache: Option<&MessageDedupCache>,
    ctx: &StrategyContext,
) -> Option<Denial> {
    let project_dir = ctx.project_dir_str();
    let active = req_state::get_active_sessions(Some(&project_dir), None).unwrap_or_default();
    let others: Vec<_> = active.into_iter().filter(|s| s.id != ctx.session_id).collect();
    if others.is_empty() {
        return None;
    }

    let auto_resolve_skill = policy
        .attribute(req_name, "auto_resolve_skill")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut substitutions = HashMap::new();
    substitutions.insert("req_name".to_string(), req_name.to_string());
    substitutions.insert("session_id".to_string(), ctx.session_id.clone());
    substitutions.insert("project_dir".to_string(), project_dir.clone());
    substitutions.insert("auto_resolve_skill".to_string(), auto_resolve_skill.clone());

    let short_from_provider = ctx
        .message_provider
        .and_then(|p| p.messages(req_name, "guard", &substitutions))
        .map(|b| b.short_message)
        .filter(|m| !m.is_empty());
    let short_message = short_from_provider.unwrap_or_else(|| format!("Guard `{req_name}` blocked (waiting...)"));

    let custom_message = policy.requirement(req_name).and_then(|r| r.message.as_deref()).filter(|m| !m.is_empty());
    let message = match custom_message {
        Some(m) => substitute_inline(
            m,
            &[("auto_resolve_skill", &auto_resolve_skill), ("session_id", &ctx.session_id), ("project_dir", &project_dir)],
        ),
        None => single_session_fallback(req_name, &others),
    };

    let cache_key = format!("{}:{}:{}:single_session", project_dir, ctx.session_id, req_name);
    Some(dedup_denial(dedup_cache, &cache_key, message, short_message, DEDUP_TTL_SECS))
}

fn single_session_fallback(req_name: &str, others: &[req_state::RegisteredSession]) -> String {
    let mut lines = vec![
        format!("## Blocked: {req_name}"),
        String::new(),
        "Another Claude Code session is active on this project.".to_string(),
        String::new(),
        "**Active sessions**:".to_string(),
    ];
    let now = req_core::now_epoch();
    for sess in others {
        let elapsed = (now - sess.last_active).max(0);
        lines.push(format!("- `{}` on `{}` ({})", sess.id, sess.branch, format_age(elapsed)));
    }
    lines.extend([
        String::new(),
        "**Actions**:".to_string(),
        "1. Close the other session".to_string(),
        "2. Wait for completion".to_string(),
        format!("3. Override: `req approve {req_name}`"),
    ]);
    lines.join("\n")
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
    fn non_protected_branch_passes() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        let policy =
            PolicyDocument::from_json(r#"{"requirements": {"no_main": {"type": "guard", "guard_type": "protected_branch"}}}"#)
                .unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        assert!(check("no_main", &policy, &mut r, None, &ctx).is_none());
    }

    #[test]
    fn protected_branch_blocks_with_override_hint() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "main");
        let policy =
            PolicyDocument::from_json(r#"{"requirements": {"no_main": {"type": "guard", "guard_type": "protected_branch"}}}"#)
                .unwrap();
        let ctx = StrategyContext::new(dir.path(), "main", "session-1");
        let denial = check("no_main", &policy, &mut r, None, &ctx).unwrap();
        assert!(denial.message.contains("protected branch `main`"));
        assert!(denial.message.contains("req approve no_main"));
    }

    #[test]
    fn session_approval_overrides_protected_branch() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "main");
        r.approve_for_session("no_main", 300, None);
        let policy =
            PolicyDocument::from_json(r#"{"requirements": {"no_main": {"type": "guard", "guard_type": "protected_branch"}}}"#)
                .unwrap();
        let ctx = StrategyContext::new(dir.path(), "main", "session-1");
        assert!(check("no_main", &policy, &mut r, None, &ctx).is_none());
    }

    #[test]
    fn unknown_requirement_fails_open() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "main");
        let policy = PolicyDocument::from_json("{}").unwrap();
        let ctx = StrategyContext::new(dir.path(), "main", "session-1");
        assert!(check("ghost", &policy, &mut r, None, &ctx).is_none());
    }
}
