use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod admin;
mod cli;
mod hook;
mod logging;

use cli::{Cli, Commands};

fn resolve_project_dir(cd: Option<&str>) -> PathBuf {
    req_hooks::git::resolve_project_root(cd).map(PathBuf::from).unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = resolve_project_dir(cli.cd.as_deref());
    let (_config, _guard) = logging::init(&project_dir);

    match cli.command {
        Commands::Hook { event } => {
            let exit_code = hook::run(&event);
            std::process::exit(exit_code);
        }
        Commands::Satisfy { requirements, session } => {
            admin::satisfy(&project_dir, &requirements, session.as_deref())?;
        }
        Commands::Approve { requirement, ttl, session, reason } => {
            admin::approve(&project_dir, &requirement, ttl, session.as_deref(), reason.as_deref())?;
        }
        Commands::Clear { requirement } => {
            admin::clear(&project_dir, &requirement)?;
        }
        Commands::ClearAll => {
            admin::clear_all(&project_dir)?;
        }
        Commands::List => {
            admin::list(&project_dir)?;
        }
        Commands::Prune { dry_run } => {
            admin::prune(&project_dir, dry_run)?;
        }
    }

    Ok(())
}
