use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch seconds, matching the `satisfied_at` /
/// `expires_at` representation used throughout branch state.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Human-readable age, with the 60s/3600s crossover points treated as
/// contractual (see SPEC_FULL.md Design Notes).
pub fn format_age(elapsed_secs: i64) -> String {
    if elapsed_secs < 60 {
        format!("{elapsed_secs}s ago")
    } else if elapsed_secs < 3600 {
        format!("{}m ago", elapsed_secs / 60)
    } else {
        format!("{}h ago", elapsed_secs / 3600)
    }
}
