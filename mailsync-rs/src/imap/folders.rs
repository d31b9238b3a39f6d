//! Folder discovery
//!
//! Parses a `LIST "" "*"` response into the logical folders the engine
//! syncs. Folders are discovered fresh every run from the live response —
//! never persisted as configuration, because server-side folder names and
//! localizations vary.

use tracing::debug;

/// Logical direction of a folder's mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Canonical local folder tag, independent of the server-visible name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFolder {
    Inbox,
    Sent,
}

impl LocalFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalFolder::Inbox => "inbox",
            LocalFolder::Sent => "sent",
        }
    }
}

/// A folder selected for synchronization.
#[derive(Debug, Clone)]
pub struct SyncFolder {
    /// Server-visible mailbox name, used in SELECT.
    pub name: String,
    pub direction: Direction,
    pub local: LocalFolder,
}

/// Known names for the sent folder, English and Cyrillic variants.
/// Case-insensitive exact match; a mailbox using an unlisted localized
/// name will not sync outbound mail (heuristic, not a guarantee).
const SENT_CANDIDATES: &[&str] = &[
    "Sent",
    "Sent Items",
    "Sent Messages",
    "Sent Mail",
    "Отправленные",
    "Исходящие",
];

/// Build the folder set from a LIST response: always INBOX, plus the
/// first recognized sent candidate.
pub fn discover(list_response: &str) -> Vec<SyncFolder> {
    let names = parse_list_names(list_response);
    debug!("Server reported {} folders", names.len());

    let mut folders = vec![SyncFolder {
        name: "INBOX".to_string(),
        direction: Direction::Inbound,
        local: LocalFolder::Inbox,
    }];

    let sent = names.iter().find(|name| {
        let lowered = name.to_lowercase();
        SENT_CANDIDATES
            .iter()
            .any(|candidate| candidate.to_lowercase() == lowered)
    });

    if let Some(name) = sent {
        folders.push(SyncFolder {
            name: name.clone(),
            direction: Direction::Outbound,
            local: LocalFolder::Sent,
        });
    }

    folders
}

/// Extract mailbox names from untagged `* LIST (flags) "delim" name` lines.
pub fn parse_list_names(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| parse_list_line(line.trim_end_matches('\r')))
        .collect()
}

fn parse_list_line(line: &str) -> Option<String> {
    let rest = line.strip_prefix("* LIST")?.trim_start();

    // Flag list: "(\HasNoChildren)"
    let rest = if rest.starts_with('(') {
        let close = rest.find(')')?;
        rest[close + 1..].trim_start()
    } else {
        rest
    };

    // Hierarchy delimiter: quoted string or NIL.
    let rest = if let Some(stripped) = rest.strip_prefix("NIL") {
        stripped.trim_start()
    } else if rest.starts_with('"') {
        let (_, after) = read_quoted(rest)?;
        after.trim_start()
    } else {
        let space = rest.find(' ')?;
        rest[space + 1..].trim_start()
    };

    // Mailbox name: quoted or bare. Literal forms ({N}) are not produced
    // for names this engine asks about and are dropped.
    if rest.starts_with('"') {
        let (name, _) = read_quoted(rest)?;
        Some(name)
    } else if rest.starts_with('{') {
        None
    } else if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Read a leading quoted string, unescaping `\"` and `\\`. Returns the
/// content and the remainder after the closing quote.
fn read_quoted(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if first != '"' {
        return None;
    }

    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some((out, &s[i + 1..]));
        } else {
            out.push(c);
        }
    }
    None
}
