use chrono::{DateTime, Utc};

/// Extract a bare address from a header value.
///
/// Prefers the angle-bracket form (`Ivan <ivan@example.com>`); otherwise
/// takes the first `token@token` substring; otherwise returns the raw
/// value unchanged.
pub fn extract_email_address(value: &str) -> String {
    let value = value.trim();

    if let (Some(open), Some(close)) = (value.find('<'), value.rfind('>')) {
        if open < close {
            return value[open + 1..close].trim().to_string();
        }
    }

    for token in value.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
        let token = token.trim_matches(|c| matches!(c, '<' | '>' | '"' | '(' | ')'));
        if let Some(at) = token.find('@') {
            if at > 0 && at + 1 < token.len() {
                return token.to_string();
            }
        }
    }

    value.to_string()
}

/// Parse an RFC 2822 Date header value.
///
/// Returns `None` on anything unparsable; a malformed Date header must
/// never abort a message.
pub fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let mut value = value.trim();

    // Strip a trailing parenthesized comment, e.g. "... +0000 (UTC)".
    if value.ends_with(')') {
        if let Some(open) = value.rfind('(') {
            value = value[..open].trim_end();
        }
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
