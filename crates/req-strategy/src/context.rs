//! Per-invocation context strategies are evaluated against: the identity
//! triple (project, branch, session) plus an optional pluggable message
//! provider (C6). Mirrors the `context: dict` parameter threaded through
//! every `RequirementStrategy.check` in the Python original.

use req_core::MessageProvider;
use std::path::{Path, PathBuf};

pub struct StrategyContext<'a> {
    pub project_dir: PathBuf,
    pub branch: String,
    pub session_id: String,
    pub message_provider: Option<&'a dyn MessageProvider>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(project_dir: &Path, branch: &str, session_id: &str) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            branch: branch.to_string(),
            session_id: session_id.to_string(),
            message_provider: None,
        }
    }

    pub fn with_message_provider(mut self, provider: &'a dyn MessageProvider) -> Self {
        self.message_provider = Some(provider);
        self
    }

    pub fn project_dir_str(&self) -> String {
        self.project_dir.to_string_lossy().to_string()
    }
}
