//! Event dispatch (C11): one function per hook event, each wrapping its
//! body in the same "resolve context, no config/no repo means silent pass,
//! any error is a logged warning not a panic" shape every Python hook in
//! the original repeats by hand.

use crate::{dangerous, git, output, status, trigger};
use req_core::normalize_session_id;
use req_policy::PolicyDocument;
use req_state::BranchRequirements;
use req_strategy::StrategyContext;
use std::path::{Path, PathBuf};

use crate::input::HookInput;

const FAILURE_THRESHOLD: u32 = 3;

/// Resolved, ready-to-use context for one hook invocation. `None` fields
/// mean "this invocation has nothing to check against" — every event
/// handler is expected to no-op (return `None`) when it needs a field that
/// isn't there.
struct HookContext {
    project_dir: PathBuf,
    branch: Option<String>,
    policy: Option<PolicyDocument>,
    session_id: String,
}

fn config_path(project_dir: &Path) -> Option<PathBuf> {
    let toml_path = project_dir.join(".claude").join("requirements.toml");
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = project_dir.join(".claude").join("requirements.json");
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

impl HookContext {
    fn resolve(input: &HookInput) -> Self {
        let session_id = normalize_session_id(input.session_id.as_deref().unwrap_or(""));
        let project_dir = git::resolve_project_root(input.cwd.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        let branch = if git::is_git_repo(&project_dir) { git::get_current_branch(&project_dir) } else { None };

        let policy = config_path(&project_dir).and_then(|path| match PolicyDocument::load(&path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load requirements config");
                None
            }
        });

        Self { project_dir, branch, policy, session_id }
    }

    fn ready(&self) -> Option<(&Path, &str, &PolicyDocument)> {
        let branch = self.branch.as_deref()?;
        let policy = self.policy.as_ref()?;
        if !policy.is_enabled() {
            return None;
        }
        Some((&self.project_dir, branch, policy))
    }

    fn strategy_ctx(&self) -> StrategyContext<'_> {
        StrategyContext::new(&self.project_dir, self.branch.as_deref().unwrap_or(""), &self.session_id)
    }
}

fn skip_requirements() -> bool {
    std::env::var_os("CLAUDE_SKIP_REQUIREMENTS").is_some()
}

/// Single entry point: parse stdin, route by `hook_event_name` (falling
/// back to `tool_name`-based heuristics PreToolUse/PostToolUse use), return
/// the response body to print (if any). Never panics; every branch that
/// would error just returns `None`.
pub fn dispatch(event_name: &str, stdin_content: &str) -> Option<String> {
    if skip_requirements() {
        return None;
    }
    let input = HookInput::parse(stdin_content);
    match event_name {
        "PreToolUse" => pre_tool_use(&input),
        "PostToolUse" => post_tool_use(&input),
        "Stop" => stop(&input),
        "SessionStart" => session_start(&input),
        "SessionEnd" => session_end(&input),
        "UserPromptSubmit" => prompt_submit(&input),
        "PreCompact" => pre_compact(&input),
        "PermissionRequest" => permission_request(&input),
        "SubagentStart" => subagent_start(&input),
        "PostToolUseFailure" => tool_failure(&input),
        "TeammateIdle" | "TaskCompleted" => None, // agent-teams quality gates: out of scope, see DESIGN.md
        other => {
            tracing::debug!(event = other, "unrecognized hook event, passing");
            None
        }
    }
}

/// `check-requirements.py`: only Edit/Write/MultiEdit trigger checks; plan
/// files under `.claude/plans/` or `~/.claude/plans/` are always skipped so
/// plan-mode writes aren't blocked by the requirements they're meant to
/// satisfy.
fn pre_tool_use(input: &HookInput) -> Option<String> {
    let tool_name = input.tool_name();
    if !matches!(tool_name, "Edit" | "Write" | "MultiEdit") {
        return None;
    }
    if let Some(path) = input.file_path() {
        if is_plan_file(path) {
            return None;
        }
    }

    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    if branch == "main" || branch == "master" {
        return None;
    }

    let _ = req_state::registry::update_registry(&ctx.session_id, &project_dir.to_string_lossy(), branch);

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let dedup_cache = req_cache::MessageDedupCache::new();
    let calc_cache = req_cache::CalculationCache::new();
    let strategy_ctx = ctx.strategy_ctx();

    for req_name in policy.all_requirements() {
        if !policy.is_requirement_enabled(req_name) {
            continue;
        }
        if !trigger::is_triggered_by(policy, req_name, tool_name, input.command()) {
            continue;
        }
        trigger::mark_triggered(&mut reqs, policy, req_name);
        if let Some(denial) =
            req_strategy::strategies::check(req_name, policy, &mut reqs, Some(&dedup_cache), Some(&calc_cache), &strategy_ctx)
        {
            return Some(output::pre_tool_deny(&denial.message));
        }
    }
    None
}

fn is_plan_file(file_path: &str) -> bool {
    let normalized = shellexpand_home(file_path);
    normalized.contains("/.claude/plans/") || normalized.contains("\\.claude\\plans\\")
}

fn shellexpand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new() {
            return home.home_dir().join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

/// `PostToolUse` covers three independent behaviors keyed on `tool_name`:
/// Skill completions auto-satisfy mapped requirements, successful Bash
/// commands clear `single_use` requirements they triggered, and
/// `ExitPlanMode` proactively surfaces unsatisfied requirements.
fn post_tool_use(input: &HookInput) -> Option<String> {
    match input.tool_name() {
        "Skill" => auto_satisfy_skill(input),
        "Bash" => clear_single_use(input),
        "ExitPlanMode" => plan_exit(input),
        _ => None,
    }
}

/// `auto-satisfy-skills.py`, simplified to the config-driven half: a
/// requirement's `satisfied_by_skill` list names the skills that complete
/// it. (The Python original also ships a hardcoded
/// `DEFAULT_SKILL_MAPPINGS` table for its own bundled skills; that's
/// product-specific backwards-compatibility cruft, not part of this
/// engine's contract, so it's not carried over here.)
fn auto_satisfy_skill(input: &HookInput) -> Option<String> {
    let skill_name = input.skill_name()?;
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let mut satisfied = Vec::new();
    for req_name in policy.all_requirements() {
        if !policy.is_requirement_enabled(req_name) {
            continue;
        }
        let Some(req) = policy.requirement(req_name) else { continue };
        if req.satisfied_by_skill.iter().any(|s| s == skill_name) {
            let metadata = serde_json::json!({"skill": skill_name});
            reqs.satisfy(req_name, policy.scope(req_name), "skill", Some(metadata), None);
            satisfied.push(req_name);
        }
    }
    if !satisfied.is_empty() {
        tracing::info!(requirements = ?satisfied, skill = skill_name, "auto-satisfied requirements from skill");
    }
    None
}

/// `clear-single-use.py`.
fn clear_single_use(input: &HookInput) -> Option<String> {
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let command = input.command();

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    for req_name in policy.all_requirements() {
        if !policy.is_requirement_enabled(req_name) || policy.scope(req_name) != req_core::Scope::SingleUse {
            continue;
        }
        if trigger::is_triggered_by(policy, req_name, "Bash", command) && reqs.clear_single_use(req_name) {
            tracing::info!(requirement = req_name, "cleared single_use requirement");
        }
    }
    None
}

/// `handle-plan-exit.py`: proactively show unsatisfied requirements the
/// moment Claude exits plan mode, before any Edit attempt can be blocked by
/// them.
fn plan_exit(input: &HookInput) -> Option<String> {
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let _ = req_state::registry::update_registry(&ctx.session_id, &project_dir.to_string_lossy(), branch);

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let strategy_ctx = ctx.strategy_ctx();
    let unsatisfied = unsatisfied_requirements(policy, &mut reqs, &strategy_ctx);
    if unsatisfied.is_empty() {
        return None;
    }

    let mut lines = vec![
        "\u{1f4cb} **Requirements Check** (Plan Mode Exited)".to_string(),
        String::new(),
        "Before proceeding with implementation, these requirements need to be satisfied:".to_string(),
        String::new(),
    ];
    for req_name in &unsatisfied {
        let scope = policy.scope(req_name);
        lines.push(format!("- **{req_name}** ({scope} scope)"));
        if let Some(message) = policy.requirement(req_name).and_then(|r| r.message.as_deref()) {
            if !message.is_empty() {
                lines.push(format!("  {message}"));
            }
        }
    }
    lines.push(String::new());
    lines.push(format!("**Session**: `{}`", ctx.session_id));
    lines.push(String::new());
    lines.push("\u{1f4a1} **Satisfy now** (run in terminal):".to_string());
    lines.push("```bash".to_string());
    lines.push(format!("req satisfy {} --session {}", unsatisfied.join(" "), ctx.session_id));
    lines.push("```".to_string());

    Some(output::context_injection("PostToolUse", &lines.join("\n")))
}

/// Requirements that are enabled and currently unsatisfied, treating guard
/// requirements' *live* condition as the source of truth rather than any
/// stored satisfaction flag.
fn unsatisfied_requirements(policy: &PolicyDocument, reqs: &mut BranchRequirements, ctx: &StrategyContext) -> Vec<String> {
    let mut unsatisfied = Vec::new();
    for req_name in policy.all_requirements() {
        if !policy.is_requirement_enabled(req_name) {
            continue;
        }
        let is_satisfied = if policy.req_type(req_name) == req_policy::ReqType::Guard {
            req_strategy::strategies::guard::check(req_name, policy, reqs, None, ctx).is_none()
        } else {
            reqs.is_satisfied(req_name, policy.scope(req_name))
        };
        if !is_satisfied {
            unsatisfied.push(req_name.to_string());
        }
    }
    unsatisfied
}

/// `handle-stop.py`: verify every triggered, in-scope requirement before
/// allowing Claude to stop. Never blocks twice in a row — `stop_hook_active`
/// means this hook already fired once for this turn and Claude already
/// continued because of it.
fn stop(input: &HookInput) -> Option<String> {
    if input.stop_hook_active {
        return None;
    }
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let verify_scopes = &policy.hooks.stop.verify_scopes;
    if !policy.hooks.stop.verify_requirements {
        return None;
    }

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let strategy_ctx = ctx.strategy_ctx();
    let mut unsatisfied = Vec::new();

    for req_name in policy.all_requirements() {
        if !policy.is_requirement_enabled(req_name) {
            continue;
        }
        let scope = policy.scope(req_name);
        if !verify_scopes.contains(&scope) {
            continue;
        }
        if !reqs.is_triggered(req_name, scope) {
            continue;
        }
        let is_satisfied = if policy.req_type(req_name) == req_policy::ReqType::Guard {
            req_strategy::strategies::guard::check(req_name, policy, &mut reqs, None, &strategy_ctx).is_none()
        } else {
            reqs.is_satisfied(req_name, scope)
        };
        if !is_satisfied {
            unsatisfied.push(req_name.to_string());
        }
    }

    if unsatisfied.is_empty() {
        return None;
    }
    tracing::info!(requirements = ?unsatisfied, "blocking stop - requirements unsatisfied");

    let mut lines = vec!["## Cannot Complete: Unsatisfied Requirements".to_string(), String::new()];
    lines.push("| Requirement | Execute |".to_string());
    lines.push("|-------------|---------|".to_string());

    let (with_skill, without_skill): (Vec<_>, Vec<_>) = unsatisfied
        .iter()
        .partition(|name| policy.attribute(name, "auto_resolve_skill").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()));

    for req_name in &with_skill {
        let skill = policy.attribute(req_name, "auto_resolve_skill").and_then(|v| v.as_str()).unwrap_or_default();
        lines.push(format!("| {req_name} | `/{skill}` |"));
    }
    for req_name in &without_skill {
        lines.push(format!("| {req_name} | `req satisfy {req_name}` |"));
    }

    lines.push(String::new());
    lines.push("Run the resolution skills above to satisfy requirements.".to_string());
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(format!("Fallback: `req satisfy {} --session {}`", unsatisfied.join(" "), ctx.session_id));

    Some(output::stop_block(&lines.join("\n")))
}

/// `handle-session-start.py`: inject a status briefing at the density the
/// session `source` (and any `injection_mode` override) calls for.
fn session_start(input: &HookInput) -> Option<String> {
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let _ = req_state::registry::update_registry(&ctx.session_id, &project_dir.to_string_lossy(), branch);

    let injection_mode = policy.hooks.session_start.injection_mode.as_deref();
    let custom_header = policy.hooks.session_start.custom_header.as_deref();
    let density = status::resolve_density(injection_mode, input.source.as_deref());

    let mut reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let strategy_ctx = ctx.strategy_ctx();
    let text = status::render(policy, &mut reqs, branch, &strategy_ctx, density, custom_header);
    if text.trim().is_empty() {
        return None;
    }
    Some(output::context_injection("SessionStart", &text))
}

/// `handle-session-end.py`: deregister the session. Cannot block session
/// end, so this always returns `None` — it's pure side effect.
fn session_end(input: &HookInput) -> Option<String> {
    let raw_session = input.session_id.as_deref()?;
    let session_id = normalize_session_id(raw_session);
    if let Err(e) = req_state::registry::remove_session(&session_id) {
        tracing::warn!(error = %e, "failed to remove session from registry");
    }
    None
}

const EDIT_KEYWORDS: &[&str] =
    &["edit", "write", "modify", "change", "update", "fix", "add", "remove", "delete", "refactor", "implement", "create", "build"];
const COMMIT_KEYWORDS: &[&str] =
    &["commit", "push", "deploy", "release", "merge", "pr ", "pull request", "git add", "git commit", "git push", "gh pr"];

fn prompt_needs_context(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    if COMMIT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }
    let words: std::collections::HashSet<&str> = lower.split_whitespace().collect();
    EDIT_KEYWORDS.iter().any(|kw| words.contains(kw))
}

/// `handle-prompt-submit.py`: inject a compact reminder only when the
/// user's prompt looks like it's about to edit or ship something.
fn prompt_submit(input: &HookInput) -> Option<String> {
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let prompt = input.prompt.as_deref()?;
    if !prompt_needs_context(prompt) {
        return None;
    }

    let reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let unsatisfied: Vec<&str> =
        policy.all_requirements().into_iter().filter(|n| policy.is_requirement_enabled(n) && !reqs.is_satisfied(n, policy.scope(n))).collect();
    if unsatisfied.is_empty() {
        return None;
    }
    let text = format!("**Requirements reminder**: {} unsatisfied: {}", unsatisfied.len(), unsatisfied.join(", "));
    Some(output::context_injection("UserPromptSubmit", &text))
}

/// `handle-pre-compact.py`: state/metrics recording only in the original;
/// this engine carries no compaction-frequency metrics (session-analytics
/// is out of scope), so this is a pass-through placeholder that still
/// confirms config/repo context resolves cleanly.
fn pre_compact(input: &HookInput) -> Option<String> {
    let ctx = HookContext::resolve(input);
    ctx.ready()?;
    None
}

/// `handle-permission-request.py`: auto-deny dangerous Bash commands.
fn permission_request(input: &HookInput) -> Option<String> {
    if input.tool_name() != "Bash" {
        return None;
    }
    let command = input.command()?;
    if command.is_empty() {
        return None;
    }

    let ctx = HookContext::resolve(input);
    let (_, _, policy) = ctx.ready()?;
    if !policy.hooks.permission_request.auto_deny_dangerous {
        return None;
    }

    let description = dangerous::match_dangerous(command)?;
    tracing::warn!(command_preview = %command.chars().take(100).collect::<String>(), reason = description, "auto-denied dangerous command");

    let reason = format!(
        "**Blocked by requirements framework**: {description}\n\nCommand: `{}`\n\nIf you need to run this command, disable the safety check:\n`req config set hooks.permission_request.auto_deny_dangerous false`",
        dangerous::truncate_command(command)
    );
    Some(output::permission_deny(&reason))
}

/// `handle-subagent-start.py`, generalized: inject requirement context into
/// any subagent whose `agent_type` looks like a review agent (contains
/// "review" or "reviewer"), rather than hardcoding one product's bundled
/// agent-name list.
fn subagent_start(input: &HookInput) -> Option<String> {
    let agent_type = input.tool_input.get("agent_type")?.as_str()?;
    if !(agent_type.contains("review") || agent_type.contains("reviewer")) {
        return None;
    }

    let ctx = HookContext::resolve(input);
    let (project_dir, branch, policy) = ctx.ready()?;
    let reqs = BranchRequirements::load(project_dir, branch, &ctx.session_id);
    let unsatisfied: Vec<&str> =
        policy.all_requirements().into_iter().filter(|n| policy.is_requirement_enabled(n) && !reqs.is_satisfied(n, policy.scope(n))).collect();

    let mut lines = vec!["## Requirements Framework Context".to_string(), String::new(), format!("**Branch**: `{branch}` | **Project**: `{}`", project_dir.display())];
    if unsatisfied.is_empty() {
        lines.push("**All requirements satisfied.**".to_string());
    } else {
        lines.push(format!("**Unsatisfied requirements**: {}", unsatisfied.join(", ")));
        lines.push(String::new());
        lines.push("Focus your review on issues that relate to these requirements.".to_string());
    }
    Some(output::context_injection("SubagentStart", &lines.join("\n")))
}

/// `handle-tool-failure.py`: after repeated Edit/Write/MultiEdit failures in
/// one session, nudge toward a review pass. The failure counter lives on
/// the branch state's requirement-agnostic session record rather than a
/// separate metrics store (this engine doesn't carry session-analytics).
fn tool_failure(input: &HookInput) -> Option<String> {
    let tool_name = input.tool_name();
    if !matches!(tool_name, "Edit" | "Write" | "MultiEdit") {
        return None;
    }
    let ctx = HookContext::resolve(input);
    let (project_dir, branch, _policy) = ctx.ready()?;

    let count = bump_failure_count(project_dir, branch, &ctx.session_id, tool_name);
    if count < FAILURE_THRESHOLD {
        return None;
    }
    let text = format!(
        "**Repeated {tool_name} failures detected** ({count} failures). Consider running a pre-commit review to identify underlying issues before continuing."
    );
    Some(output::context_injection("PostToolUseFailure", &text))
}

fn bump_failure_count(project_dir: &Path, branch: &str, session_id: &str, tool_name: &str) -> u32 {
    let mut reqs = BranchRequirements::load(project_dir, branch, session_id);
    let key = format!("__failures_{tool_name}");
    let previous =
        reqs.requirement(&key).and_then(|r| r.metadata.as_ref()).and_then(|m| m.get("count")).and_then(|v| v.as_u64()).unwrap_or(0);
    let next = previous + 1;
    reqs.satisfy(&key, req_core::Scope::Permanent, "internal", Some(serde_json::json!({"count": next})), None);
    next as u32
}
