//! Dangerous-command auto-deny table for `PermissionRequest` (C11), ported
//! verbatim from `handle-permission-request.py::DANGEROUS_PATTERNS`.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

struct Pattern {
    re: Regex,
    /// Extra substring-based exclusion, checked against the regex match
    /// itself, for the two rules Python expresses with a negative
    /// lookahead — the `regex` crate has none, so these are expressed as a
    /// plain "matched, but also contains this substring" veto instead.
    unless_match_contains: Option<&'static str>,
    description: &'static str,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let ci = |pat: &str| RegexBuilder::new(pat).case_insensitive(true).build().expect("static pattern is valid");
        let cs = |pat: &str| Regex::new(pat).expect("static pattern is valid");
        vec![
            Pattern {
                re: cs(r"rm\s+(-[rfR]+\s+)?/\S*"),
                unless_match_contains: Some("/tmp"),
                description: "Destructive rm on root directory",
            },
            Pattern {
                re: cs(r"git\s+push\s+\S*\s*--force\S*"),
                unless_match_contains: Some("--force-with-lease"),
                description: "Force push without lease protection",
            },
            Pattern { re: cs(r"git\s+push\s+.*-f\b"), unless_match_contains: None, description: "Force push (shorthand)" },
            Pattern {
                re: cs(r"git\s+reset\s+--hard\s+origin/(?:main|master)"),
                unless_match_contains: None,
                description: "Hard reset to remote main",
            },
            Pattern {
                re: cs(r"git\s+clean\s+-[dfx]+"),
                unless_match_contains: None,
                description: "Git clean (removes untracked files)",
            },
            Pattern { re: ci(r"DROP\s+(?:TABLE|DATABASE)"), unless_match_contains: None, description: "SQL DROP statement" },
            Pattern { re: ci(r"TRUNCATE\s+TABLE"), unless_match_contains: None, description: "SQL TRUNCATE statement" },
        ]
    })
}

/// First matching dangerous-pattern description, if any.
pub fn match_dangerous(command: &str) -> Option<&'static str> {
    patterns()
        .iter()
        .find(|p| match p.re.find(command) {
            Some(m) => p.unless_match_contains.is_none_or(|veto| !m.as_str().contains(veto)),
            None => false,
        })
        .map(|p| p.description)
}

/// Truncate a command preview to 80 chars with an ellipsis, matching
/// `handle-permission-request.py`'s `command[:80]` truncation.
pub fn truncate_command(command: &str) -> String {
    if command.chars().count() > 80 {
        let head: String = command.chars().take(80).collect();
        format!("{head}...")
    } else {
        command.to_string()
    }
}
