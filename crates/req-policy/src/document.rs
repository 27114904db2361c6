//! Policy reader (C14): a read-only typed view over a single already-merged
//! policy document.
//!
//! This does **not** walk global/project/local config directories — that
//! cascade is an explicit out-of-scope product feature (see SPEC_FULL.md
//! §1). The caller hands this reader one JSON or TOML string (however it was
//! assembled) and gets back typed, validated accessors, grounded on the
//! Python original's `RequirementsConfig` (`config.py`) and its companion
//! strategy-selection table (`requirement_strategies.py`).

use req_core::Scope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_trigger_tools() -> Vec<String> {
    vec!["Edit".to_string(), "Write".to_string(), "MultiEdit".to_string()]
}

fn default_triggers() -> Vec<TriggerSpec> {
    default_trigger_tools().into_iter().map(TriggerSpec::Tool).collect()
}

/// One entry in a requirement's `trigger_tools` list (C13): either a bare
/// tool-name string, or `{tool, command_pattern}` narrowing the match to
/// invocations whose `tool_input.command` matches a regex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerSpec {
    Tool(String),
    Pattern {
        tool: String,
        #[serde(default)]
        command_pattern: Option<String>,
    },
}

impl TriggerSpec {
    pub fn tool(&self) -> &str {
        match self {
            TriggerSpec::Tool(t) => t,
            TriggerSpec::Pattern { tool, .. } => tool,
        }
    }

    pub fn command_pattern(&self) -> Option<&str> {
        match self {
            TriggerSpec::Tool(_) => None,
            TriggerSpec::Pattern { command_pattern, .. } => command_pattern.as_deref(),
        }
    }

    /// Does `(tool_name, command)` activate this trigger? Matches C13:
    /// tool name must match exactly; if `command_pattern` is present, it must
    /// case-insensitively match somewhere in `command`. An invalid regex is
    /// logged and treated as non-matching, never propagated.
    pub fn matches(&self, tool_name: &str, command: Option<&str>) -> bool {
        if self.tool() != tool_name {
            return false;
        }
        match self.command_pattern() {
            None => true,
            Some(pattern) => {
                let re = match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => re,
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "invalid trigger command_pattern, skipping");
                        return false;
                    }
                };
                command.map(|c| re.is_match(c)).unwrap_or(false)
            }
        }
    }
}

fn default_cache_ttl() -> i64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReqType {
    Blocking,
    Guard,
    Dynamic,
}

impl Default for ReqType {
    fn default() -> Self {
        ReqType::Blocking
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardType {
    ProtectedBranch,
    SingleSession,
}

/// One requirement's configuration. Deliberately a single flat struct (not a
/// type-per-kind hierarchy) mirroring the original's one-dict-per-requirement
/// shape; [`PolicyDocument::blocking_config`] / `guard_config` /
/// `dynamic_config` narrow it for each strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: Scope,
    #[serde(rename = "type", default)]
    pub req_type: ReqType,
    #[serde(default = "default_triggers")]
    pub trigger_tools: Vec<TriggerSpec>,
    #[serde(default)]
    pub checklist: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,

    // Dynamic-only fields.
    #[serde(default)]
    pub calculator: Option<String>,
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
    #[serde(default)]
    pub blocking_message: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: i64,

    // Guard-only fields.
    #[serde(default)]
    pub guard_type: Option<GuardType>,
    #[serde(default)]
    pub protected_branches: Option<Vec<String>>,

    /// Skills that auto-satisfy this requirement when invoked (PostTool
    /// auto-satisfy-skill event).
    #[serde(default)]
    pub satisfied_by_skill: Vec<String>,

    /// Anything else the document carries for this requirement: still
    /// reachable via [`PolicyDocument::attribute`].
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_protected_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopHookConfig {
    #[serde(default = "default_true")]
    pub verify_requirements: bool,
    #[serde(default = "default_verify_scopes")]
    pub verify_scopes: Vec<Scope>,
}

fn default_verify_scopes() -> Vec<Scope> {
    vec![Scope::Session]
}

impl Default for StopHookConfig {
    fn default() -> Self {
        Self { verify_requirements: true, verify_scopes: default_verify_scopes() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequestConfig {
    #[serde(default = "default_true")]
    pub auto_deny_dangerous: bool,
}

impl Default for PermissionRequestConfig {
    fn default() -> Self {
        Self { auto_deny_dangerous: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSubmitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PromptSubmitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `SessionStart` status-briefing density override and header, analogous to
/// `StopHookConfig`/`PermissionRequestConfig` — a document-wide setting
/// rather than a per-requirement one, so it lives on `HooksSection` rather
/// than `RequirementConfig::extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStartConfig {
    /// `None`/`"auto"` picks density from the session `source`; otherwise
    /// one of `"compact"`/`"standard"`/`"rich"`.
    #[serde(default)]
    pub injection_mode: Option<String>,
    #[serde(default)]
    pub custom_header: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksSection {
    #[serde(default)]
    pub stop: StopHookConfig,
    #[serde(default)]
    pub permission_request: PermissionRequestConfig,
    #[serde(default)]
    pub prompt_submit: PromptSubmitConfig,
    #[serde(default)]
    pub session_start: SessionStartConfig,
}

/// The merged policy document as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub requirements: HashMap<String, RequirementConfig>,
    #[serde(default)]
    pub hooks: HooksSection,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self { enabled: true, requirements: HashMap::new(), hooks: HooksSection::default() }
    }
}

/// Narrowed view for the blocking strategy (C8).
pub struct BlockingView<'a> {
    pub message: &'a str,
    pub checklist: &'a [String],
}

/// Narrowed view for the guard strategy (C9).
pub struct GuardView<'a> {
    pub guard_type: GuardType,
    pub protected_branches: Vec<String>,
    pub message: Option<&'a str>,
}

/// Narrowed view for the dynamic strategy (C10).
pub struct DynamicView<'a> {
    pub calculator: &'a str,
    pub thresholds: &'a HashMap<String, f64>,
    pub blocking_message: &'a str,
    pub cache_ttl: i64,
}

const DEFAULT_BLOCKING_MESSAGE_TEMPLATE: &str = "Requirement {req_name} not satisfied";

impl PolicyDocument {
    /// Parse JSON.
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let mut doc: Self = serde_json::from_str(s)?;
        doc.validate();
        Ok(doc)
    }

    /// Parse TOML.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let mut doc: Self = toml::from_str(s)?;
        doc.validate();
        Ok(doc)
    }

    /// Load from a path, dispatching on extension (`.toml` vs everything
    /// else, which is treated as JSON). Missing file yields the default
    /// (empty, enabled) document rather than an error — an absent policy
    /// file means "nothing configured", not "engine misconfigured".
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            Self::from_toml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Disable (and log) any requirement whose configuration is internally
    /// inconsistent, so one bad entry never takes down the whole document.
    fn validate(&mut self) {
        let mut to_disable = Vec::new();
        for (name, req) in self.requirements.iter() {
            if let Err(reason) = validate_requirement(req) {
                tracing::warn!(requirement = %name, reason, "disabling invalid requirement");
                to_disable.push(name.clone());
            }
        }
        for name in to_disable {
            if let Some(req) = self.requirements.get_mut(&name) {
                req.enabled = false;
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Requirement names in deterministic (sorted) order — evaluation order
    /// within an event must be reproducible.
    pub fn all_requirements(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.requirements.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn requirement(&self, name: &str) -> Option<&RequirementConfig> {
        self.requirements.get(name)
    }

    pub fn is_requirement_enabled(&self, name: &str) -> bool {
        self.requirements.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    pub fn req_type(&self, name: &str) -> ReqType {
        self.requirements.get(name).map(|r| r.req_type).unwrap_or_default()
    }

    pub fn scope(&self, name: &str) -> Scope {
        self.requirements.get(name).map(|r| r.scope).unwrap_or_default()
    }

    /// Plain tool names this requirement's triggers cover, discarding any
    /// `command_pattern` narrowing — for simple-membership call sites
    /// (PromptSubmit/clear-single-use) that only need "did tool X run".
    pub fn trigger_tools(&self, name: &str) -> Vec<String> {
        self.triggers(name).iter().map(|t| t.tool().to_string()).collect()
    }

    /// Full trigger specs (C13), including any `command_pattern` narrowing.
    pub fn triggers(&self, name: &str) -> Vec<TriggerSpec> {
        self.requirements.get(name).map(|r| r.trigger_tools.clone()).unwrap_or_else(default_triggers)
    }

    /// Generic accessor over a requirement's unstructured extra fields,
    /// mirroring `RequirementsConfig.get_attribute`.
    pub fn attribute<'a>(&'a self, name: &str, key: &str) -> Option<&'a serde_json::Value> {
        self.requirements.get(name)?.extra.get(key)
    }

    pub fn blocking_config<'a>(&'a self, name: &str) -> Option<BlockingView<'a>> {
        let req = self.requirements.get(name)?;
        Some(BlockingView {
            message: req.message.as_deref().unwrap_or("Requirement not satisfied."),
            checklist: &req.checklist,
        })
    }

    pub fn guard_config<'a>(&'a self, name: &str) -> Option<GuardView<'a>> {
        let req = self.requirements.get(name)?;
        Some(GuardView {
            guard_type: req.guard_type?,
            protected_branches: req.protected_branches.clone().unwrap_or_else(default_protected_branches),
            message: req.message.as_deref(),
        })
    }

    pub fn dynamic_config<'a>(&'a self, name: &str) -> Option<DynamicView<'a>> {
        let req = self.requirements.get(name)?;
        Some(DynamicView {
            calculator: req.calculator.as_deref()?,
            thresholds: &req.thresholds,
            blocking_message: req.blocking_message.as_deref().unwrap_or(DEFAULT_BLOCKING_MESSAGE_TEMPLATE),
            cache_ttl: req.cache_ttl,
        })
    }
}

fn validate_requirement(req: &RequirementConfig) -> Result<(), String> {
    match req.req_type {
        ReqType::Blocking => Ok(()),
        ReqType::Guard => {
            if req.guard_type.is_none() {
                return Err("guard requirement missing 'guard_type'".to_string());
            }
            Ok(())
        }
        ReqType::Dynamic => {
            if req.calculator.is_none() {
                return Err("dynamic requirement missing 'calculator'".to_string());
            }
            if !req.thresholds.contains_key("block") {
                return Err("dynamic requirement missing 'thresholds.block'".to_string());
            }
            if req.thresholds.values().any(|v| *v < 0.0) {
                return Err("dynamic requirement threshold must be non-negative".to_string());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_enabled_with_no_requirements() {
        let doc = PolicyDocument::from_json("{}").unwrap();
        assert!(doc.is_enabled());
        assert!(doc.all_requirements().is_empty());
    }

    #[test]
    fn blocking_requirement_round_trips() {
        let json = r#"{
            "requirements": {
                "commit_plan": {"enabled": true, "scope": "session", "message": "Plan first"}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert!(doc.is_requirement_enabled("commit_plan"));
        assert_eq!(doc.scope("commit_plan"), Scope::Session);
        assert_eq!(doc.blocking_config("commit_plan").unwrap().message, "Plan first");
    }

    #[test]
    fn dynamic_missing_threshold_is_disabled() {
        let json = r#"{
            "requirements": {
                "branch_size": {"type": "dynamic", "calculator": "branch_size"}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert!(!doc.is_requirement_enabled("branch_size"));
    }

    #[test]
    fn dynamic_with_thresholds_is_valid() {
        let json = r#"{
            "requirements": {
                "branch_size": {
                    "type": "dynamic",
                    "calculator": "branch_size",
                    "thresholds": {"warn": 400, "block": 800}
                }
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert!(doc.is_requirement_enabled("branch_size"));
        let dyn_cfg = doc.dynamic_config("branch_size").unwrap();
        assert_eq!(dyn_cfg.calculator, "branch_size");
        assert_eq!(dyn_cfg.thresholds.get("block"), Some(&800.0));
    }

    #[test]
    fn guard_missing_guard_type_is_disabled() {
        let json = r#"{
            "requirements": {
                "no_main_edits": {"type": "guard"}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert!(!doc.is_requirement_enabled("no_main_edits"));
    }

    #[test]
    fn guard_with_protected_branch_is_valid() {
        let json = r#"{
            "requirements": {
                "no_main_edits": {"type": "guard", "guard_type": "protected_branch", "protected_branches": ["main"]}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert!(doc.is_requirement_enabled("no_main_edits"));
        let guard = doc.guard_config("no_main_edits").unwrap();
        assert_eq!(guard.guard_type, GuardType::ProtectedBranch);
        assert_eq!(guard.protected_branches, vec!["main".to_string()]);
    }

    #[test]
    fn unknown_trigger_tools_default_to_edit_write_multiedit() {
        let json = r#"{"requirements": {"commit_plan": {}}}"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert_eq!(doc.trigger_tools("commit_plan"), vec!["Edit", "Write", "MultiEdit"]);
    }

    #[test]
    fn all_requirements_is_sorted() {
        let json = r#"{"requirements": {"zeta": {}, "alpha": {}, "mid": {}}}"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        assert_eq!(doc.all_requirements(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn toml_document_parses() {
        let toml_src = r#"
            enabled = true

            [requirements.commit_plan]
            enabled = true
            scope = "session"
        "#;
        let doc = PolicyDocument::from_toml(toml_src).unwrap();
        assert!(doc.is_requirement_enabled("commit_plan"));
    }

    #[test]
    fn missing_path_yields_default_document() {
        let doc = PolicyDocument::load(Path::new("/nonexistent/requirements.json")).unwrap();
        assert!(doc.is_enabled());
    }

    #[test]
    fn bare_string_trigger_matches_tool_name_only() {
        let json = r#"{"requirements": {"commit_plan": {"trigger_tools": ["Bash"]}}}"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        let triggers = doc.triggers("commit_plan");
        assert_eq!(triggers.len(), 1);
        assert!(triggers[0].matches("Bash", None));
        assert!(!triggers[0].matches("Edit", None));
    }

    #[test]
    fn command_pattern_trigger_requires_regex_match() {
        let json = r#"{
            "requirements": {
                "no_force_push": {
                    "trigger_tools": [{"tool": "Bash", "command_pattern": "git push.*--force"}]
                }
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        let triggers = doc.triggers("no_force_push");
        assert!(triggers[0].matches("Bash", Some("git push --FORCE origin main")));
        assert!(!triggers[0].matches("Bash", Some("git push origin main")));
        assert!(!triggers[0].matches("Edit", Some("git push --force")));
    }

    #[test]
    fn invalid_command_pattern_never_matches() {
        let json = r#"{
            "requirements": {
                "bad": {"trigger_tools": [{"tool": "Bash", "command_pattern": "("}]}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        let triggers = doc.triggers("bad");
        assert!(!triggers[0].matches("Bash", Some("anything")));
    }

    #[test]
    fn protected_branch_default_is_main_master() {
        let json = r#"{
            "requirements": {
                "no_main_edits": {"type": "guard", "guard_type": "protected_branch"}
            }
        }"#;
        let doc = PolicyDocument::from_json(json).unwrap();
        let guard = doc.guard_config("no_main_edits").unwrap();
        assert_eq!(guard.protected_branches, vec!["main".to_string(), "master".to_string()]);
    }
}
