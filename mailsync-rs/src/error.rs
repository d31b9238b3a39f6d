use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Fatal error: aborts the whole synchronization run.
///
/// Everything that can go wrong per folder or per batch is a
/// [`SyncWarning`] instead and is accumulated alongside partial results.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed server greeting: {0}")]
    Greeting(String),

    #[error("authentication failed ({0})")]
    Auth(AuthDiagnostics),

    #[error("account {0} not found")]
    AccountNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Diagnostic block carried by authentication failures.
///
/// Contains the last raw tagged response (truncated), the username and host
/// attempted, and the server capability string. Never the secret.
#[derive(Debug, Clone)]
pub struct AuthDiagnostics {
    pub username: String,
    pub host: String,
    pub capability: String,
    pub last_response: String,
}

impl fmt::Display for AuthDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} on {}; capability: {}; last response: {}",
            self.username, self.host, self.capability, self.last_response
        )
    }
}

/// Error produced by the command engine for a single exchange.
///
/// Mapped by callers into either a fatal [`SyncError`] (handshake phase) or
/// a per-unit [`SyncWarning`] (folder/batch phase).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The tagged terminal line did not arrive before the deadline.
    /// The socket has been force-closed; `partial` holds whatever
    /// accumulated in the buffer, for error reporting.
    #[error("{command} timed out after {timeout:?}")]
    TimedOut {
        command: String,
        timeout: Duration,
        partial: String,
    },

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// The partial response text, if any was read before the failure.
    pub fn partial_response(&self) -> &str {
        match self {
            SessionError::TimedOut { partial, .. } => partial,
            _ => "",
        }
    }
}

/// Non-fatal, per-unit failure: the unit is skipped and the run continues.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// A folder could not be selected or listed; it is skipped entirely.
    Folder { folder: String, detail: String },
    /// One FETCH batch failed; the remaining batches continue.
    Fetch { folder: String, batch: String, detail: String },
    /// A FETCH response could not be parsed into messages.
    Parse { folder: String, detail: String },
    /// A batch insert failed; the uncovered range is retried next run.
    Persist { folder: String, detail: String },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::Folder { folder, detail } => {
                write!(f, "folder {} skipped: {}", folder, detail)
            }
            SyncWarning::Fetch { folder, batch, detail } => {
                write!(f, "fetch batch {} in {} skipped: {}", batch, folder, detail)
            }
            SyncWarning::Parse { folder, detail } => {
                write!(f, "unparseable fetch response in {}: {}", folder, detail)
            }
            SyncWarning::Persist { folder, detail } => {
                write!(f, "batch insert in {} failed: {}", folder, detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_diagnostics_never_mention_secret() {
        let diag = AuthDiagnostics {
            username: "ivan@example.com".to_string(),
            host: "imap.example.com".to_string(),
            capability: "* CAPABILITY IMAP4rev1 AUTH=PLAIN".to_string(),
            last_response: "A3 NO LOGIN failed".to_string(),
        };
        let rendered = SyncError::Auth(diag).to_string();
        assert!(rendered.contains("ivan@example.com"));
        assert!(rendered.contains("imap.example.com"));
        assert!(rendered.contains("A3 NO LOGIN failed"));
    }

    #[test]
    fn test_warning_display_names_the_unit() {
        let warning = SyncWarning::Folder {
            folder: "Sent".to_string(),
            detail: "A4 NO SELECT failed".to_string(),
        };
        assert!(warning.to_string().contains("Sent"));
    }
}
