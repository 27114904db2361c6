//! The `req hook <event>` subcommand: the thin process boundary the host
//! actually invokes on every tool call. Reads the full JSON payload from
//! stdin, dispatches through `req-hooks::router`, and prints whatever
//! envelope (if any) comes back. Always exits 0 — every hook response in
//! this engine is communicated via the JSON body, not the process exit code
//! (the one exception, `TeammateIdle`/`TaskCompleted`'s exit-code-2
//! feedback convention, is out of scope; see DESIGN.md).

use std::io::Read;

pub fn run(event: &str) -> i32 {
    let mut stdin_content = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut stdin_content) {
        tracing::warn!(error = %e, "failed to read hook stdin, proceeding with empty input");
    }

    let response = req_hooks::dispatch(event, &stdin_content);
    req_hooks::output::emit(response);
    0
}
