//! C16 logging bootstrap. Hook subcommands run as short-lived subprocesses
//! invoked by the host on every tool call, so stdout is reserved for the
//! JSON envelope (`output.rs`) — every tracing layer writes to stderr or a
//! file, never to stdout.

use req_policy::EngineConfig;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Global + project engine-config paths, following the same two-tier
/// directory convention as the policy document itself.
fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".claude").join("requirements-engine.toml"))
}

fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".claude").join("requirements-engine.toml")
}

/// `$HOME/.claude/requirements.log`, the default JSON-Lines audit log path
/// used when no config layer sets `log_file` explicitly.
fn default_log_file() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".claude").join("requirements.log"))
}

/// Resolve the engine config for `project_dir` and install the `tracing`
/// subscriber: a plain-text stderr layer always, plus a structured JSON-Lines layer
/// writing to `EngineConfig::log_file` when configured, since the audit log
/// at `$HOME/.claude/requirements.log` needs to be machine-parseable.
/// Returns a guard that must stay alive for the duration of the process when
/// file logging is active (dropping it flushes the non-blocking writer).
/// `try_init()` semantics throughout — a failed init here is never fatal.
pub fn init(project_dir: &Path) -> (EngineConfig, Option<WorkerGuard>) {
    let mut config = EngineConfig::load(global_config_path().as_deref(), Some(&project_config_path(project_dir)), None);
    if config.log_file.is_none() {
        config.log_file = default_log_file();
    }

    let stderr_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_file {
        Some(log_file) => {
            let directory = log_file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let file_name = log_file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "requirements.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry().with(stderr_filter).with(stderr_layer).with(file_layer).try_init();

    (config, guard)
}
