//! IMAP command engine
//!
//! The session object owns the socket, the accumulating read buffer, and
//! the tag counter, so the engine is testable against any in-memory stream
//! and instantiable per account without hidden shared state.
//!
//! The protocol is strictly sequential: every command is fully answered
//! before the next is issued, so the whole buffer accumulated between a
//! write and its tagged terminal line is that command's response.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use crate::error::SessionError;

/// Tagged command completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// One command's complete response: the tagged terminal line plus every
/// untagged `*` line that preceded it.
#[derive(Debug, Clone)]
pub struct CommandReply {
    pub tag: String,
    pub status: Status,
    /// The tagged terminal line itself.
    pub line: String,
    /// The full accumulated response text, untagged data included.
    pub body: String,
}

impl CommandReply {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// An IMAP session over an arbitrary async stream.
pub struct ImapSession<S> {
    stream: S,
    buffer: Vec<u8>,
    tag_counter: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            tag_counter: 0,
        }
    }

    /// Next unique tag: `A1`, `A2`, ...
    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Read the server greeting (the first line the server sends).
    pub async fn read_greeting(&mut self, deadline: Duration) -> Result<String, SessionError> {
        let text = self
            .read_until(deadline, "greeting", |buf| find_line_end(buf).is_some())
            .await?;
        let greeting = text.lines().next().unwrap_or("").to_string();
        debug!("< {}", greeting);
        Ok(greeting)
    }

    /// Send `{tag} {command}\r\n` and accumulate reads until the line
    /// `{tag} OK|NO|BAD ...` appears or the deadline passes.
    ///
    /// On timeout the socket is force-closed (fail-safe against a hung
    /// peer) and the partial buffer travels in the error for reporting.
    pub async fn send_command(
        &mut self,
        command: &str,
        deadline: Duration,
    ) -> Result<CommandReply, SessionError> {
        let tag = self.next_tag();
        let command_name = command.split_whitespace().next().unwrap_or("").to_string();
        debug!("> {} {}", tag, command_name);

        self.stream
            .write_all(format!("{} {}\r\n", tag, command).as_bytes())
            .await?;

        let body = self
            .read_until(deadline, &command_name, |buf| {
                tagged_line(buf, &tag).is_some()
            })
            .await?;

        // read_until only returns once the terminal line is in the buffer.
        let line = tagged_line(body.as_bytes(), &tag).unwrap_or_default();
        let status = match line
            .split_whitespace()
            .nth(1)
            .map(|s| s.to_ascii_uppercase())
            .as_deref()
        {
            Some("OK") => Status::Ok,
            Some("NO") => Status::No,
            _ => Status::Bad,
        };
        trace!("< {}", line);

        Ok(CommandReply { tag, status, line, body })
    }

    /// Accumulate reads into the buffer until `done` matches, then drain
    /// the buffer and return it as text.
    async fn read_until(
        &mut self,
        deadline: Duration,
        context: &str,
        done: impl Fn(&[u8]) -> bool,
    ) -> Result<String, SessionError> {
        let expires = Instant::now() + deadline;
        let mut chunk = [0u8; 4096];

        while !done(&self.buffer) {
            let remaining = match expires.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(self.timed_out(context, deadline).await),
            };

            match timeout(remaining, self.stream.read(&mut chunk)).await {
                Err(_) => return Err(self.timed_out(context, deadline).await),
                Ok(Ok(0)) => return Err(SessionError::PeerClosed),
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(SessionError::Io(e)),
            }
        }

        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Ok(text)
    }

    async fn timed_out(&mut self, context: &str, deadline: Duration) -> SessionError {
        let partial = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        let _ = self.stream.shutdown().await;
        SessionError::TimedOut {
            command: context.to_string(),
            timeout: deadline,
            partial,
        }
    }

    /// Best-effort LOGOUT; errors are ignored, the socket is closing anyway.
    pub async fn logout(&mut self, deadline: Duration) {
        let _ = self.send_command("LOGOUT", deadline).await;
    }

    /// Close the underlying stream. Safe to call after a timeout already
    /// force-closed it.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Find the tagged terminal line `{tag} OK|NO|BAD ...` in the buffer,
/// if it has arrived.
fn tagged_line(buffer: &[u8], tag: &str) -> Option<String> {
    let text = String::from_utf8_lossy(buffer);
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(tag) {
            if !rest.starts_with(' ') {
                continue;
            }
            let word = rest
                .split_whitespace()
                .next()
                .map(|s| s.to_ascii_uppercase());
            if matches!(word.as_deref(), Some("OK") | Some("NO") | Some("BAD")) {
                return Some(line.to_string());
            }
        }
    }
    None
}

fn find_line_end(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}
