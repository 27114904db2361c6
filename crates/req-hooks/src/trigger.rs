//! Trigger matching (C13): does this tool invocation activate a
//! requirement's check? Thin wrapper over [`req_policy::TriggerSpec`] plus
//! the "mark as triggered" bookkeeping the PreTool router performs after
//! every dispatch.

use req_policy::{PolicyDocument, TriggerSpec};
use req_state::BranchRequirements;

/// Whether any of `req_name`'s configured triggers match this tool call.
pub fn is_triggered_by(policy: &PolicyDocument, req_name: &str, tool_name: &str, command: Option<&str>) -> bool {
    policy.triggers(req_name).iter().any(|t: &TriggerSpec| t.matches(tool_name, command))
}

/// Record that a requirement was dispatched for the current session, so the
/// Stop handler knows not to re-verify requirements this session never
/// touched.
pub fn mark_triggered(reqs: &mut BranchRequirements, policy: &PolicyDocument, req_name: &str) {
    reqs.mark_triggered(req_name, policy.scope(req_name));
}
