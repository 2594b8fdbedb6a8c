//! UTF-8 safe truncation for log fields.
//!
//! Registration tokens are credentials; only a short prefix ever reaches
//! the logs.

/// Bytes of a token kept when logging it.
pub const TOKEN_LOG_PREFIX: usize = 8;

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Log-safe form of a registration token: a short prefix plus `…`.
pub fn redact_token(token: &str) -> String {
    let prefix = truncate_str(token, TOKEN_LOG_PREFIX);
    if prefix.len() == token.len() {
        prefix.to_owned()
    } else {
        format!("{prefix}…")
    }
}
