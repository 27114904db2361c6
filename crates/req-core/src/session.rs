/// Canonicalize a host-supplied session identifier (hex string or UUID) to
/// the first 8 hex characters, lowercased.
///
/// A UUID's first hyphen-delimited segment is already 8 hex characters, so
/// this also does the right thing for `CLAUDE_SESSION_ID` values shaped like
/// `abcd1234-...`. Shorter identifiers (already-canonical 8-char keys, or
/// legacy ppid-derived ids) pass through unchanged save for lowercasing.
pub fn normalize_session_id(raw: &str) -> String {
    raw.chars().take(8).collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_uuid_to_first_segment() {
        assert_eq!(
            normalize_session_id("ABCD1234-5678-90ab-cdef-000000000000"),
            "abcd1234"
        );
    }

    #[test]
    fn idempotent_on_already_short_key() {
        assert_eq!(normalize_session_id("abcd1234"), "abcd1234");
        assert_eq!(
            normalize_session_id(&normalize_session_id("abcd1234")),
            "abcd1234"
        );
    }

    #[test]
    fn passes_through_shorter_ids() {
        assert_eq!(normalize_session_id("pid42"), "pid42");
    }
}
