//! Strategy dispatch (C8/C9/C10): one entry point that routes a requirement
//! to its kind-specific checker based on [`ReqType`].

pub mod blocking;
pub mod dynamic;
pub mod guard;

use crate::context::StrategyContext;
use req_cache::MessageDedupCache;
use req_policy::{PolicyDocument, ReqType};
use req_state::BranchRequirements;
use std::collections::HashMap;

/// A denial, in two registers: the full directive-first message shown the
/// first time a requirement blocks, and a short one shown on repeat
/// (deduplicated) blocks within the same TTL window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub message: String,
    pub short_message: String,
}

/// Dispatch a requirement check to the strategy matching its configured
/// type. `None` means "pass" (satisfied, approved, or fail-open); `Some`
/// carries the denial to surface to the caller.
pub fn check(
    req_name: &str,
    policy: &PolicyDocument,
    reqs: &mut BranchRequirements,
    dedup_cache: Option<&MessageDedupCache>,
    calc_cache: Option<&req_cache::CalculationCache>,
    ctx: &StrategyContext,
) -> Option<Denial> {
    match policy.req_type(req_name) {
        ReqType::Blocking => blocking::check(req_name, policy, reqs, dedup_cache, ctx),
        ReqType::Guard => guard::check(req_name, policy, reqs, dedup_cache, ctx),
        ReqType::Dynamic => dynamic::check(req_name, policy, reqs, dedup_cache, calc_cache, ctx),
    }
}

/// Shared dedup gate used by all three strategies: show the full message the
/// first time (or after the TTL expires), fall back to `short_message` for
/// repeat calls within the window. Mirrors each Python strategy's identical
/// `self.dedup_cache.should_show_message(...)` block.
pub(crate) fn dedup_denial(
    cache: Option<&MessageDedupCache>,
    cache_key: &str,
    message: String,
    short_message: String,
    ttl_secs: i64,
) -> Denial {
    match cache {
        Some(c) if !c.should_show_message(cache_key, &message, ttl_secs) => {
            Denial { message: short_message.clone(), short_message }
        }
        _ => Denial { short_message, message },
    }
}

/// `str.format(**vars)`-alike: substitutes every `{key}` with `vars[key]`.
/// If any placeholder has no entry in `vars`, logs a warning and returns the
/// template unmodified — matching the Python original's `KeyError` fallback
/// in `_format_message_template`, which is all-or-nothing rather than
/// partial substitution.
pub(crate) fn format_template(req_name: &str, template: &str, vars: &HashMap<String, String>) -> String {
    let placeholder = placeholder_re();
    for caps in placeholder.captures_iter(template) {
        let key = &caps[1];
        if !vars.contains_key(key) {
            tracing::warn!(requirement = req_name, key, "template references undefined variable");
            return template.to_string();
        }
    }
    placeholder
        .replace_all(template, |caps: &regex::Captures| vars.get(&caps[1]).cloned().unwrap_or_default())
        .to_string()
}

fn placeholder_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{(\w+)\}").unwrap())
}

/// Replace the two placeholders the Python original substitutes into inline
/// `message`/custom-message config strings (not full `.format()` templating,
/// just two literal `.replace()` calls).
pub(crate) fn substitute_inline(message: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = message.to_string();
    for (key, value) in replacements {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_template_substitutes_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("req_name".to_string(), "commit_plan".to_string());
        vars.insert("value".to_string(), "42".to_string());
        let out = format_template("commit_plan", "{req_name} is at {value}", &vars);
        assert_eq!(out, "commit_plan is at 42");
    }

    #[test]
    fn format_template_falls_back_on_unknown_key() {
        let vars = HashMap::new();
        let out = format_template("commit_plan", "value is {missing}", &vars);
        assert_eq!(out, "value is {missing}");
    }

    #[test]
    fn substitute_inline_replaces_only_named_placeholders() {
        let out = substitute_inline("Hi {session_id}, see {auto_resolve_skill}", &[("session_id", "abc1"), ("auto_resolve_skill", "my-skill")]);
        assert_eq!(out, "Hi abc1, see my-skill");
    }
}
