use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "req", version, about = "Developer-workflow requirements engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to CLAUDE_PROJECT_DIR, then the current directory)
    #[arg(long, global = true)]
    pub cd: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a hook event, reading the host's JSON payload from stdin.
    Hook {
        /// Hook event name, e.g. PreToolUse, Stop, SessionStart.
        event: String,
    },

    /// Manually mark a requirement satisfied.
    Satisfy {
        /// One or more requirement names.
        requirements: Vec<String>,

        /// Session id to satisfy for (defaults to CLAUDE_SESSION_ID, then "manual").
        #[arg(long)]
        session: Option<String>,
    },

    /// Grant a temporary emergency bypass for a guard requirement.
    Approve {
        requirement: String,

        /// Approval validity, in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,

        #[arg(long)]
        session: Option<String>,

        /// Free-text reason, stored in the approval's metadata.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Clear a single requirement's state on the current branch.
    Clear {
        requirement: String,
    },

    /// Clear all requirement state on the current branch.
    ClearAll,

    /// List every requirement and its current status on the current branch.
    List,

    /// Remove stale per-branch state files and dead registry sessions.
    Prune {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}
