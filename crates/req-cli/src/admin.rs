//! Operator-facing subcommands (`req satisfy`/`approve`/`clear`/`clear-all`/
//! `list`/`prune`), the CLI counterpart to the skill-driven calls the same
//! `BranchRequirements` API gets from `req-hooks::router`. Grounded on
//! `requirements.py`'s CLI entry points (`req satisfy`, `req approve`,
//! `req clear`) and `session.py`'s registry-pruning maintenance command.

use anyhow::{Context, Result, bail};
use req_core::normalize_session_id;
use req_policy::PolicyDocument;
use req_state::BranchRequirements;
use std::path::{Path, PathBuf};

fn resolve_branch(project_dir: &Path) -> Result<String> {
    req_hooks::git::get_current_branch(project_dir).context("not on a git branch (detached HEAD or not a repository)")
}

fn resolve_session(explicit: Option<&str>) -> String {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("CLAUDE_SESSION_ID").ok())
        .unwrap_or_else(|| "manual".to_string());
    normalize_session_id(&raw)
}

fn config_path(project_dir: &Path) -> Option<PathBuf> {
    let toml_path = project_dir.join(".claude").join("requirements.toml");
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = project_dir.join(".claude").join("requirements.json");
    if json_path.exists() { Some(json_path) } else { None }
}

fn load_policy(project_dir: &Path) -> Result<PolicyDocument> {
    let path = config_path(project_dir).context("no requirements.toml or requirements.json found under .claude/")?;
    PolicyDocument::load(&path)
}

pub fn satisfy(project_dir: &Path, requirements: &[String], session: Option<&str>) -> Result<()> {
    if requirements.is_empty() {
        bail!("no requirements given");
    }
    let branch = resolve_branch(project_dir)?;
    let session_id = resolve_session(session);
    let policy = load_policy(project_dir)?;
    let mut reqs = BranchRequirements::load(project_dir, &branch, &session_id);

    for name in requirements {
        if policy.requirement(name).is_none() {
            println!("warning: {name} is not defined in the requirements config");
            continue;
        }
        reqs.satisfy(name, policy.scope(name), "cli", None, None);
        println!("satisfied: {name}");
    }
    Ok(())
}

pub fn approve(project_dir: &Path, requirement: &str, ttl: i64, session: Option<&str>, reason: Option<&str>) -> Result<()> {
    let branch = resolve_branch(project_dir)?;
    let session_id = resolve_session(session);
    let mut reqs = BranchRequirements::load(project_dir, &branch, &session_id);
    let metadata = reason.map(|r| serde_json::json!({"reason": r}));
    reqs.approve_for_session(requirement, ttl, metadata);
    println!("approved: {requirement} (expires in {ttl}s)");
    Ok(())
}

pub fn clear(project_dir: &Path, requirement: &str) -> Result<()> {
    let branch = resolve_branch(project_dir)?;
    let mut reqs = BranchRequirements::load(project_dir, &branch, "cli");
    reqs.clear(requirement);
    println!("cleared: {requirement}");
    Ok(())
}

pub fn clear_all(project_dir: &Path) -> Result<()> {
    let branch = resolve_branch(project_dir)?;
    let mut reqs = BranchRequirements::load(project_dir, &branch, "cli");
    reqs.clear_all();
    println!("cleared all requirement state for branch {branch}");
    Ok(())
}

pub fn list(project_dir: &Path) -> Result<()> {
    let branch = resolve_branch(project_dir)?;
    let policy = load_policy(project_dir)?;
    let session_id = resolve_session(None);
    let reqs = BranchRequirements::load(project_dir, &branch, &session_id);

    println!("Requirements on branch `{branch}`:");
    for name in policy.all_requirements() {
        let enabled = policy.is_requirement_enabled(name);
        let satisfied = enabled && reqs.is_satisfied(name, policy.scope(name));
        let mark = if !enabled {
            "disabled"
        } else if satisfied {
            "satisfied"
        } else {
            "pending"
        };
        println!("  {name:<30} {:?}  {mark}", policy.req_type(name));
    }
    Ok(())
}

pub fn prune(project_dir: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        let active = req_state::get_active_sessions(None, None)?;
        println!("{} session(s) currently registered (dry run, no changes made)", active.len());
    } else {
        let removed = req_state::cleanup_stale_sessions()?;
        println!("removed {removed} stale session(s)");
    }

    let states = req_state::branch::list_all_states(project_dir);
    println!("{} branch state file(s) on record", states.len());
    Ok(())
}
