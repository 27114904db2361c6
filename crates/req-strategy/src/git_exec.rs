//! Timeout-bounded `git` subprocess calls for calculators (C15).
//!
//! Argv-only `Command` construction, never a shell string, plus the 3s
//! per-call timeout the Python original's `subprocess.run(timeout=3)` has,
//! since calculators run against untrusted/arbitrary branch state.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `git <args>` in `cwd`, killing it if it hasn't finished within 3s.
pub fn run_git(args: &[&str], cwd: &Path) -> GitOutput {
    let mut child = match Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "failed to spawn git");
            return GitOutput { success: false, stdout: String::new(), stderr: "spawn failed".to_string() };
        }
    };

    let pid = child.id();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(GIT_TIMEOUT) {
        Ok(Ok(output)) => GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        Ok(Err(e)) => GitOutput { success: false, stdout: String::new(), stderr: e.to_string() },
        Err(_) => {
            // SAFETY: pid is our own just-spawned child; SIGKILL on timeout only.
            unsafe { libc::kill(pid as i32, libc::SIGKILL) };
            GitOutput { success: false, stdout: String::new(), stderr: "timeout".to_string() }
        }
    }
}
