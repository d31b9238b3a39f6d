//! Search and fetch helpers
//!
//! Protocol-level grammar for the orchestrator: the IMAP date format,
//! EXISTS/SEARCH response parsing, and the batched FETCH command.

use chrono::{Datelike, NaiveDate};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Format a date per the IMAP date grammar: `5-Jan-2024`, no zero padding.
pub fn format_imap_date(date: NaiveDate) -> String {
    format!(
        "{}-{}-{}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Parse the message count from an untagged `* N EXISTS` line.
/// Absent line means zero.
pub fn parse_exists(response: &str) -> u32 {
    for line in response.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("* ") {
            if let Some(count) = rest.strip_suffix(" EXISTS") {
                if let Ok(count) = count.trim().parse() {
                    return count;
                }
            }
        }
    }
    0
}

/// Parse sequence numbers from an untagged `* SEARCH n1 n2 ...` line.
pub fn parse_search(response: &str) -> Vec<u32> {
    for line in response.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            return rest
                .split_whitespace()
                .filter_map(|token| token.parse().ok())
                .collect();
        }
    }
    Vec::new()
}

/// Comma-joined sequence set for one FETCH batch.
pub fn sequence_set(batch: &[u32]) -> String {
    batch
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The FETCH command for one batch: UID, size, and raw headers only.
/// Bodies are never fetched.
pub fn fetch_command(batch: &[u32]) -> String {
    format!(
        "FETCH {} (UID RFC822.SIZE RFC822.HEADER)",
        sequence_set(batch)
    )
}
