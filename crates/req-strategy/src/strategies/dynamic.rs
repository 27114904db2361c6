//! Dynamic requirement strategy (C10): automatically calculated via a
//! registered [`crate::calculator::Calculator`], evaluated against
//! `warn`/`block` thresholds, with a short-TTL calculation cache in front of
//! the (potentially expensive) calculator run. Ported from
//! `dynamic_strategy.py`'s `DynamicRequirementStrategy`.

use super::{Denial, dedup_denial, format_template};
use crate::calculator::{self, CalcResult};
use crate::context::StrategyContext;
use req_cache::{CalculationCache, MessageDedupCache};
use req_core::Scope;
use req_policy::PolicyDocument;
use req_state::BranchRequirements;
use std::collections::HashMap;

const DEDUP_TTL_SECS: i64 = 5;

pub fn check(
    req_name: &str,
    policy: &PolicyDocument,
    reqs: &mut BranchRequirements,
    dedup_cache: Option<&MessageDedupCache>,
    calc_cache: Option<&CalculationCache>,
    ctx: &StrategyContext,
) -> Option<Denial> {
    // Satisfied at branch level (`req satisfy --branch`), checked through the
    // session scope since `is_satisfied` consults branch-level overrides first.
    if reqs.is_satisfied(req_name, Scope::Session) {
        return None;
    }
    if reqs.is_approved(req_name) {
        return None;
    }

    let view = policy.dynamic_config(req_name)?;
    let project_dir = ctx.project_dir_str();
    let cache_key = format!("{project_dir}:{}:{req_name}", ctx.branch);

    let result = get_or_calculate(req_name, view.calculator, view.cache_ttl, &cache_key, calc_cache, ctx)?;

    let block_threshold = view.thresholds.get("block").copied().unwrap_or(f64::INFINITY);
    let warn_threshold = view.thresholds.get("warn").copied().unwrap_or(f64::INFINITY);

    if result.value >= block_threshold {
        return Some(block_denial(req_name, view.blocking_message, &view.thresholds, &result, dedup_cache, ctx));
    }
    if result.value >= warn_threshold {
        tracing::warn!(requirement = req_name, summary = %result.summary, value = result.value, "dynamic requirement over warn threshold");
    }
    None
}

fn get_or_calculate(
    req_name: &str,
    calculator_name: &str,
    cache_ttl: i64,
    cache_key: &str,
    calc_cache: Option<&CalculationCache>,
    ctx: &StrategyContext,
) -> Option<CalcResult> {
    if let Some(cache) = calc_cache {
        if let Some(cached) = cache.get(cache_key, cache_ttl) {
            match serde_json::from_value::<CalcResult>(cached) {
                Ok(result) => return Some(result),
                Err(e) => tracing::warn!(requirement = req_name, error = %e, "cached calculation result is malformed, recalculating"),
            }
        }
    }

    let Some(calc) = calculator::lookup(calculator_name) else {
        tracing::warn!(requirement = req_name, calculator = calculator_name, "unknown calculator, failing open");
        return None;
    };

    let result = calc.calculate(&ctx.project_dir, &ctx.branch)?;
    if let Some(cache) = calc_cache {
        if let Ok(value) = serde_json::to_value(&result) {
            cache.set(cache_key, value);
        }
    }
    Some(result)
}

fn block_denial(
    req_name: &str,
    template: &str,
    thresholds: &HashMap<String, f64>,
    result: &CalcResult,
    dedup_cache: Option<&MessageDedupCache>,
    ctx: &StrategyContext,
) -> Denial {
    let mut substitutions = HashMap::new();
    substitutions.insert("req_name".to_string(), req_name.to_string());
    substitutions.insert("total".to_string(), fmt_num(result.value));
    substitutions.insert("value".to_string(), fmt_num(result.value));
    substitutions.insert("summary".to_string(), result.summary.clone());
    substitutions.insert("warn_threshold".to_string(), fmt_num(thresholds.get("warn").copied().unwrap_or(0.0)));
    substitutions.insert("block_threshold".to_string(), fmt_num(thresholds.get("block").copied().unwrap_or(0.0)));
    for (key, value) in &result.extra {
        substitutions.insert(key.clone(), value_to_string(value));
    }

    let from_provider = ctx
        .message_provider
        .and_then(|p| p.messages(req_name, "dynamic", &substitutions))
        .map(|b| b.blocking_message)
        .filter(|m| !m.is_empty());

    let body = from_provider.unwrap_or_else(|| format_template(req_name, template, &substitutions));
    let message = format!("{body}{}", approval_instructions(req_name, &ctx.session_id));
    let short_message = format!("\u{23f8}\u{fe0f} Requirement `{req_name}` not satisfied (waiting...)");

    let cache_key = format!("{}:{}:{}:{}", ctx.project_dir_str(), ctx.branch, ctx.session_id, req_name);
    dedup_denial(dedup_cache, &cache_key, message, short_message, DEDUP_TTL_SECS)
}

fn approval_instructions(req_name: &str, session_id: &str) -> String {
    format!("\n\n\u{1f4a1} **To approve and continue**:\n```bash\nreq satisfy {req_name} --session {session_id}\n```")
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() { format!("{}", v as i64) } else { v.to_string() }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
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
    fn unknown_calculator_fails_open() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        let policy = PolicyDocument::from_json(
            r#"{"requirements": {"branch_size": {"type": "dynamic", "calculator": "does_not_exist", "thresholds": {"block": 1}}}}"#,
        )
        .unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        assert!(check("branch_size", &policy, &mut r, None, None, &ctx).is_none());
    }

    #[test]
    fn protected_branch_is_not_calculated() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "main");
        let policy = PolicyDocument::from_json(
            r#"{"requirements": {"branch_size": {"type": "dynamic", "calculator": "branch_size", "thresholds": {"block": 1}}}}"#,
        )
        .unwrap();
        let ctx = StrategyContext::new(dir.path(), "main", "session-1");
        assert!(check("branch_size", &policy, &mut r, None, None, &ctx).is_none());
    }

    #[test]
    fn branch_level_satisfaction_short_circuits() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        r.satisfy("branch_size", Scope::Branch, "cli", None, None);
        let policy = PolicyDocument::from_json(
            r#"{"requirements": {"branch_size": {"type": "dynamic", "calculator": "does_not_exist", "thresholds": {"block": 1}}}}"#,
        )
        .unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        assert!(check("branch_size", &policy, &mut r, None, None, &ctx).is_none());
    }

    #[test]
    fn approval_short_circuits() {
        let dir = tempdir().unwrap();
        let mut r = reqs(dir.path(), "feature/x");
        r.approve_for_session("branch_size", 300, None);
        let policy = PolicyDocument::from_json(
            r#"{"requirements": {"branch_size": {"type": "dynamic", "calculator": "does_not_exist", "thresholds": {"block": 1}}}}"#,
        )
        .unwrap();
        let ctx = StrategyContext::new(dir.path(), "feature/x", "session-1");
        assert!(check("branch_size", &policy, &mut r, None, None, &ctx).is_none());
    }

    #[test]
    fn fmt_num_drops_trailing_zero() {
        assert_eq!(fmt_num(42.0), "42");
        assert_eq!(fmt_num(42.5), "42.5");
    }
}
