//! Hook stdout envelopes (C11): the exact JSON shapes the host parses.
//! Silent success is empty stdout + exit 0, always — these builders only
//! ever get called on the non-silent paths.

use serde_json::json;

/// `PreToolUse` deny. Uses `"deny"`, never `"ask"` — `ask` can be overridden
/// by a user's `permissions.allow` entries, `deny` cannot (see
/// `check-requirements.py::output_prompt`'s docstring).
pub fn pre_tool_deny(reason: &str) -> String {
    json!({
        "hookSpecificOutput": {
            "hookEventName": "PreToolUse",
            "permissionDecision": "deny",
            "permissionDecisionReason": reason,
        }
    })
    .to_string()
}

/// `Stop` block. Never emitted when `stop_hook_active` is already true —
/// callers must check that before calling this.
pub fn stop_block(reason: &str) -> String {
    json!({
        "decision": "block",
        "reason": reason,
    })
    .to_string()
}

/// Additional context injected for an event (SessionStart/PreCompact/etc).
pub fn context_injection(hook_event_name: &str, text: &str) -> String {
    json!({
        "hookSpecificOutput": {
            "hookEventName": hook_event_name,
            "additionalContext": text,
        }
    })
    .to_string()
}

/// `PermissionRequest` deny.
pub fn permission_deny(reason: &str) -> String {
    json!({
        "decision": "deny",
        "reason": reason,
    })
    .to_string()
}

/// Write a response to stdout, or nothing (silent success).
pub fn emit(response: Option<String>) {
    if let Some(body) = response {
        println!("{body}");
    }
}
