//! Helpers for keeping secrets out of logs and debug output
//!
//! Tokens, nonces and authorization codes are shown as a short prefix only.
//! Truncation respects UTF-8 boundaries so a multi-byte character at the cut
//! point never panics.

/// Bytes of a secret that may appear in logs
pub const REDACTED_PREFIX_LEN: usize = 6;

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes.
///
/// # Example
/// ```
/// use oauth_deeplink::utils::safe_truncate;
///
/// // Emoji is 4 bytes - truncating at byte 10 would cut it in half
/// let text = "Status: 🔍 Active";
/// assert_eq!(safe_truncate(text, 10), "Status: ");
/// ```
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Render a secret for logging: a short prefix followed by `…`.
///
/// Values no longer than twice the prefix are fully masked, since showing
/// half of a short secret gives too much away.
///
/// # Example
/// ```
/// use oauth_deeplink::utils::redact;
///
/// assert_eq!(redact("gho_abcdefghijklmnop"), "gho_ab…");
/// assert_eq!(redact("short"), "***");
/// assert_eq!(redact(""), "<empty>");
/// ```
#[must_use]
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    if secret.len() <= REDACTED_PREFIX_LEN * 2 {
        return "***".to_string();
    }
    format!("{}…", safe_truncate(secret, REDACTED_PREFIX_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_ascii() {
        let text = "Hello, World!";
        assert_eq!(safe_truncate(text, 7), "Hello, ");
        assert_eq!(safe_truncate(text, 100), text);
        assert_eq!(safe_truncate(text, 0), "");
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        // "é" is 2 bytes; cutting at 1 must back off to 0
        assert_eq!(safe_truncate("é", 1), "");
        assert_eq!(safe_truncate("aé", 2), "a");
    }

    #[test]
    fn test_redact_never_returns_whole_secret() {
        let secret = "Xy7_kP2mQ9-abcdefghijklmnopqrstuvwxyz012345";
        let shown = redact(secret);
        assert!(shown.starts_with("Xy7_kP"));
        assert!(!shown.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_redact_multibyte_secret() {
        let shown = redact("🔑🔑🔑🔑🔑🔑🔑🔑");
        assert_eq!(shown, "🔑…");
    }
}
