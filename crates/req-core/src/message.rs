//! C6 message provider: an external contract the engine consumes but never
//! depends on the implementation of. Strategies ask an optional
//! `&dyn MessageProvider` for a bundle of display text; when none is wired
//! up (or it declines), they fall back to `requirement.message` or a
//! built-in directive-first fallback, matching the Python original's
//! inline-fallback behavior in `requirement_strategies.py`/`guard_strategy.py`.

use std::collections::HashMap;

/// Display text for one requirement check. Fields mirror the substitution
/// outputs the original's `MessageLoader.format(...)` produces.
#[derive(Debug, Clone, Default)]
pub struct MessageBundle {
    pub blocking_message: String,
    pub short_message: String,
    pub success_message: String,
    pub header: String,
    pub action_label: String,
    pub fallback_text: String,
}

/// Turns `(requirement_name, requirement_type, substitutions)` into display
/// text. Substitution keys include at least `req_name`, `session_id`,
/// `branch`, `project_dir`, `auto_resolve_skill`, `value`, `block_threshold`,
/// `warn_threshold`, `summary`, `base_branch`.
pub trait MessageProvider {
    fn messages(&self, req_name: &str, req_type: &str, substitutions: &HashMap<String, String>) -> Option<MessageBundle>;
}
