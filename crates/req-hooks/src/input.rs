//! Hook stdin parsing (C11). Grounded on `hook_utils.py::parse_hook_input`:
//! tolerate empty stdin, malformed JSON, and wrong-typed fields by
//! normalizing to sensible defaults rather than erroring.

use serde::Deserialize;

/// The stdin payload every Claude Code hook receives, generalized across
/// event types — most fields are only present for some events, hence
/// `Option`/defaulted throughout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: serde_json::Value,
    #[serde(default)]
    pub tool_response: serde_json::Value,
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl HookInput {
    /// Parse stdin content, falling back to an all-default payload on empty
    /// input or malformed JSON rather than erroring — matches the Python
    /// original's "fail open, return empty dict" behavior.
    pub fn parse(stdin_content: &str) -> Self {
        if stdin_content.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(stdin_content) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "hook input JSON parse error, proceeding with empty payload");
                Self::default()
            }
        }
    }

    pub fn tool_name(&self) -> &str {
        self.tool_name.as_deref().unwrap_or("")
    }

    pub fn command(&self) -> Option<&str> {
        self.tool_input.get("command")?.as_str()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.tool_input.get("file_path")?.as_str()
    }

    pub fn skill_name(&self) -> Option<&str> {
        self.tool_input.get("skill_name")?.as_str().or_else(|| self.tool_input.get("name")?.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stdin_yields_default() {
        let input = HookInput::parse("");
        assert_eq!(input.tool_name(), "");
    }

    #[test]
    fn malformed_json_fails_open_to_default() {
        let input = HookInput::parse("{not json");
        assert_eq!(input.tool_name(), "");
    }

    #[test]
    fn parses_bash_command() {
        let input = HookInput::parse(r#"{"tool_name":"Bash","tool_input":{"command":"rm -rf /"}}"#);
        assert_eq!(input.tool_name(), "Bash");
        assert_eq!(input.command(), Some("rm -rf /"));
    }
}
