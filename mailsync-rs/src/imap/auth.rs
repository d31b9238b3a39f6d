//! IMAP client authentication
//!
//! Greeting gate, capability capture, then AUTHENTICATE PLAIN (RFC 4616,
//! base64 initial response) with a LOGIN fallback for servers that reject
//! it. The secret never appears in logs or error payloads.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{AuthDiagnostics, Result, SessionError, SyncError};
use crate::imap::session::ImapSession;
use crate::storage::Account;

/// Drive the handshake: greeting, CAPABILITY, then authentication.
///
/// Returns the capability string on success. Any failure here is fatal to
/// the run.
pub async fn authenticate<S: AsyncRead + AsyncWrite + Unpin>(
    session: &mut ImapSession<S>,
    account: &Account,
    deadline: Duration,
) -> Result<String> {
    let greeting = session
        .read_greeting(deadline)
        .await
        .map_err(|e| SyncError::Greeting(e.to_string()))?;

    if !greeting.contains("OK") {
        return Err(SyncError::Greeting(truncate(&greeting, 200)));
    }

    // Capability is diagnostic only; a server that rejects it can still
    // authenticate.
    let capability = match session.send_command("CAPABILITY", deadline).await {
        Ok(reply) => reply
            .body
            .lines()
            .find(|line| line.starts_with("* CAPABILITY"))
            .unwrap_or("")
            .trim_end()
            .to_string(),
        Err(e) => {
            warn!("CAPABILITY failed: {}", e);
            String::new()
        }
    };
    debug!("Server capability: {}", capability);

    let mut last_response = String::new();

    match auth_plain(session, account, deadline).await {
        Ok(line) if line.is_empty() => {
            info!("Authenticated via AUTHENTICATE PLAIN");
            return Ok(capability);
        }
        Ok(line) => last_response = line,
        Err(e) => last_response = e.partial_response().to_string(),
    }
    debug!("AUTHENTICATE PLAIN rejected, falling back to LOGIN");

    match login(session, account, deadline).await {
        Ok(line) if line.is_empty() => {
            info!("Authenticated via LOGIN");
            return Ok(capability);
        }
        Ok(line) => last_response = line,
        Err(e) => {
            if !e.partial_response().is_empty() {
                last_response = e.partial_response().to_string();
            } else {
                last_response = e.to_string();
            }
        }
    }

    Err(SyncError::Auth(AuthDiagnostics {
        username: account.username.clone(),
        host: account.host.clone(),
        capability,
        last_response: truncate(&last_response, 200),
    }))
}

/// AUTHENTICATE PLAIN with the `\0user\0pass` payload as an initial
/// response. Returns an empty string on success, the raw tagged line on
/// rejection.
async fn auth_plain<S: AsyncRead + AsyncWrite + Unpin>(
    session: &mut ImapSession<S>,
    account: &Account,
    deadline: Duration,
) -> std::result::Result<String, SessionError> {
    let payload = plain_payload(&account.username, &account.secret);
    let reply = session
        .send_command(&format!("AUTHENTICATE PLAIN {}", payload), deadline)
        .await?;
    if reply.is_ok() {
        Ok(String::new())
    } else {
        Ok(reply.line)
    }
}

/// LOGIN with quoted, escaped credentials. Same return convention as
/// [`auth_plain`].
async fn login<S: AsyncRead + AsyncWrite + Unpin>(
    session: &mut ImapSession<S>,
    account: &Account,
    deadline: Duration,
) -> std::result::Result<String, SessionError> {
    let reply = session
        .send_command(
            &format!(
                "LOGIN \"{}\" \"{}\"",
                escape_imap_string(&account.username),
                escape_imap_string(&account.secret)
            ),
            deadline,
        )
        .await?;
    if reply.is_ok() {
        Ok(String::new())
    } else {
        Ok(reply.line)
    }
}

/// SASL PLAIN payload: Base64 of `\0authcid\0password`.
pub fn plain_payload(username: &str, secret: &str) -> String {
    BASE64.encode(format!("\0{}\0{}", username, secret))
}

/// Escape a value for an IMAP quoted string: backslash and double quote
/// are backslash-prefixed.
pub fn escape_imap_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_payload_round_trips() {
        let payload = plain_payload("ivan@example.com", "secret123");
        let decoded = BASE64.decode(payload).unwrap();
        assert_eq!(decoded, b"\0ivan@example.com\0secret123");
    }

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape_imap_string(r#"pa"ss"#), r#"pa\"ss"#);
        assert_eq!(escape_imap_string(r"pa\ss"), r"pa\\ss");
        assert_eq!(escape_imap_string("plain"), "plain");
    }

    #[test]
    fn test_escaped_value_never_terminates_the_quoted_string() {
        for input in [r#"a"b"#, r"a\b", r#""""#, r#"\\\""#, "mixed\\\"end"] {
            let escaped = escape_imap_string(input);
            // Every quote inside the escaped form must be preceded by a
            // backslash, so the surrounding quotes stay balanced.
            let bytes = escaped.as_bytes();
            for (i, &b) in bytes.iter().enumerate() {
                if b == b'"' {
                    let mut backslashes = 0;
                    let mut j = i;
                    while j > 0 && bytes[j - 1] == b'\\' {
                        backslashes += 1;
                        j -= 1;
                    }
                    assert_eq!(backslashes % 2, 1, "unescaped quote in {:?}", escaped);
                }
            }
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let value = "привет мир";
        let cut = truncate(value, 7);
        assert!(cut.len() <= 7);
        assert!(value.starts_with(&cut));
    }
}
