//! FETCH response parsing
//!
//! Splits a multi-message FETCH response into per-message records and the
//! raw header block inside each. Three line kinds matter: untagged `* N
//! FETCH` data lines, the tagged status line, and the literal marker
//! `{N}` — a literal is introduced by `{N}` followed by a line break and
//! is the next N raw bytes regardless of embedded CRLFs.

use tracing::trace;

/// One fetched message before decoding: sequence number, UID, reported
/// size, and the unfolded header block. Does not outlive one batch.
#[derive(Debug, Clone)]
pub struct CandidateMessage {
    pub sequence: u32,
    pub uid: u32,
    pub size: u64,
    pub headers: HeaderBlock,
}

/// Parse a full FETCH response into candidate messages. Records without a
/// UID or a parseable header literal are dropped.
pub fn parse_fetch_response(response: &str) -> Vec<CandidateMessage> {
    split_fetch_records(response)
        .into_iter()
        .filter_map(parse_fetch_record)
        .collect()
}

/// Slice the response into one chunk per `* N FETCH` delimiter line.
fn split_fetch_records(response: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut offset = 0;

    for line in response.split_inclusive('\n') {
        if is_fetch_delimiter(line) {
            starts.push(offset);
        }
        offset += line.len();
    }

    let mut records = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(response.len());
        records.push(&response[start..end]);
    }
    records
}

fn is_fetch_delimiter(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("* ") else {
        return false;
    };
    let mut parts = rest.split_whitespace();
    let is_number = parts
        .next()
        .map(|n| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
        .unwrap_or(false);
    is_number && parts.next() == Some("FETCH")
}

fn parse_fetch_record(record: &str) -> Option<CandidateMessage> {
    let sequence = record
        .strip_prefix("* ")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;

    let uid = number_after(record, "UID ")?;
    let size = number_after(record, "RFC822.SIZE ").unwrap_or(0);

    let raw_headers = extract_literal(record)?;
    trace!("Parsed record seq={} uid={} size={}", sequence, uid, size);

    Some(CandidateMessage {
        sequence,
        uid: uid as u32,
        size,
        headers: HeaderBlock::parse(raw_headers),
    })
}

/// First decimal number following `token` in `s`.
fn number_after(s: &str, token: &str) -> Option<u64> {
    let start = s.find(token)? + token.len();
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Locate the `{N}` marker and return the N bytes after the following
/// line break as the literal payload, clamped to what actually arrived.
fn extract_literal(record: &str) -> Option<&str> {
    let open = record.find('{')?;
    let close = record[open..].find('}')? + open;
    let declared: usize = record[open + 1..close].parse().ok()?;

    let after_marker = &record[close + 1..];
    let payload_start = after_marker.find('\n')? + 1;
    let payload = &after_marker[payload_start..];

    let end = floor_char_boundary(payload, declared.min(payload.len()));
    Some(&payload[..end])
}

/// Largest index `<= at` that lands on a char boundary. The buffer went
/// through a lossy decode, so a declared byte count can fall inside a
/// replacement character.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

/// An unfolded header block with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    entries: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Unfold continuation lines (a line break followed by leading
    /// whitespace collapses to a single space), then split each header on
    /// the first colon.
    pub fn parse(raw: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        let mut current: Option<(String, String)> = None;

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break; // end of the header block
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some(entry) = current.take() {
                entries.push(entry);
            }

            if let Some(colon) = line.find(':') {
                let name = line[..colon].trim().to_string();
                let value = line[colon + 1..].trim().to_string();
                current = Some((name, value));
            }
        }

        if let Some(entry) = current.take() {
            entries.push(entry);
        }

        Self { entries }
    }

    /// Case-insensitive lookup of the first header with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> String {
        let headers_one = "From: Ivan <ivan@example.com>\r\nTo: sales@crm.example\r\nSubject: Hello\r\nDate: Fri, 5 Jan 2024 10:52:37 +0200\r\n\r\n";
        let headers_two = "From: anna@example.com\r\nSubject: Re:\r\n offer\r\n\r\n";
        format!(
            "* 1 FETCH (UID 101 RFC822.SIZE 2400 RFC822.HEADER {{{}}}\r\n{})\r\n\
             * 2 FETCH (UID 102 RFC822.SIZE 1800 RFC822.HEADER {{{}}}\r\n{})\r\n\
             A5 OK FETCH completed\r\n",
            headers_one.len(),
            headers_one,
            headers_two.len(),
            headers_two
        )
    }

    #[test]
    fn test_splits_into_one_record_per_message() {
        let response = sample_response();
        let messages = parse_fetch_response(&response);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence, 1);
        assert_eq!(messages[0].uid, 101);
        assert_eq!(messages[0].size, 2400);
        assert_eq!(messages[1].uid, 102);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = sample_response();
        let messages = parse_fetch_response(&response);
        assert_eq!(
            messages[0].headers.get("from"),
            Some("Ivan <ivan@example.com>")
        );
        assert_eq!(messages[0].headers.get("SUBJECT"), Some("Hello"));
    }

    #[test]
    fn test_folded_header_unfolds_to_single_space() {
        let response = sample_response();
        let messages = parse_fetch_response(&response);
        assert_eq!(messages[1].headers.get("Subject"), Some("Re: offer"));
    }

    #[test]
    fn test_record_without_literal_is_dropped() {
        let response = "* 1 FETCH (UID 101 RFC822.SIZE 2400)\r\nA5 OK FETCH completed\r\n";
        assert!(parse_fetch_response(response).is_empty());
    }

    #[test]
    fn test_record_without_uid_is_dropped() {
        let response = "* 1 FETCH (RFC822.SIZE 12 RFC822.HEADER {5}\r\nX: y\r\n)\r\nA5 OK\r\n";
        assert!(parse_fetch_response(response).is_empty());
    }

    #[test]
    fn test_literal_length_is_respected() {
        // The literal declares 12 bytes; the trailing ")\r\n" and the
        // tagged line are not part of the header block.
        let headers = "X-Test: ab\r\n";
        let response = format!(
            "* 7 FETCH (UID 9 RFC822.SIZE 40 RFC822.HEADER {{{}}}\r\n{})\r\nA5 OK done\r\n",
            headers.len(),
            headers
        );
        let messages = parse_fetch_response(&response);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].headers.get("X-Test"), Some("ab"));
    }

    #[test]
    fn test_empty_response_yields_nothing() {
        assert!(parse_fetch_response("A5 OK FETCH completed\r\n").is_empty());
        assert!(parse_fetch_response("").is_empty());
    }
}
