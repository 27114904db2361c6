//! Blocking requirement strategy (C8): manually satisfied via `req satisfy`.
//! Ported from `blocking_strategy.py`'s `BlockingRequirementStrategy`.

use super::{Denial, dedup_denial, substitute_inline};
use crate::context::StrategyContext;
use req_cache::MessageDedupCache;
use req_policy::PolicyDocument;
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
    let scope = policy.scope(req_name);
    if reqs.is_satisfied(req_name, scope) {
        return None;
    }
    Some(denial(req_name, policy, dedup_cache, ctx))
}

fn denial(req_name: &str, policy: &PolicyDocument, dedup_cache: Option<&MessageDedupCache>, ctx: &StrategyContext) -> Denial {
    let configured_message = policy.requirement(req_name).and_then(|r| r.message.clone()).filter(|m| !m.is_empty());
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
        .and_then(|p| p.messages(req_name, "blocking", &substitutions))
        .filter(|bundle| !bundle.blocking_message.is_empty());

    let (message, short_message) = if let Some(bundle) = from_provider {
        (bundle.blocking_message, bundle.short_message)
    } else {
        let message = match configured_message {
            Some(m) => substitute_inline(&m, &[("auto_resolve_skill", &auto_resolve_skill), ("session_id", &ctx.session_id)]),
            None => fallback_message(req_name, &auto_resolve_skill, &ctx.session_id),
        };
        let short_message = format!("Requirement `{req_name}` not satisfied (waiting...)");
        (message, short_message)
    };

    if message.is_empty() {
        return Denial { message: fallback_message(req_name, &auto_resolve_skill, &ctx.session_id), short_message };
    }

    let cache_key = format!("{}:{}:{}:{}", ctx.project_dir_str(), ctx.branch, ctx.session_id, req_name);
    dedup_denial(dedup_cache, &cache_key, message, short_message, DEDUP_TTL_SECS)
}

fn fallback_message(req_name: &str, auto_resolve_skill: &str, session_id: &str) -> String {
    let mut lines = vec![format!("## Blocked: {req_name}"), String::new()];
    if !auto_resolve_skill.is_empty() {
        lines.push(format!("**Execute**: `/{auto_resolve_skill}`"));
    } else {
        lines.push(format!("**Action**: `req satisfy {req_name} --session {session_id}`"));
    }
    lines.join("\n")
}
