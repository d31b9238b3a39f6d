//! RFC 2047 encoded-word decoding
//!
//! Handles `=?charset?B?...?=` and `=?charset?Q?...?=` tokens in header
//! values. Per RFC 2047 §6.2, whitespace between two adjacent encoded-words
//! must not be rendered, so adjacent words are joined before decoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::charset::Charset;

/// Decode every encoded-word in a header value, passing plain text through.
pub fn decode_header_value(value: &str) -> String {
    let joined = join_adjacent_encoded_words(value);
    let mut out = String::with_capacity(joined.len());
    let mut rest = joined.as_str();

    while let Some(start) = rest.find("=?") {
        match decode_encoded_word(&rest[start..]) {
            Some((decoded, consumed)) => {
                out.push_str(&rest[..start]);
                out.push_str(&decoded);
                rest = &rest[start + consumed..];
            }
            None => {
                // Not a well-formed encoded-word; keep the marker literally.
                out.push_str(&rest[..start + 2]);
                rest = &rest[start + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Collapse whitespace between the end of one encoded-word and the start of
/// the next, so `=?..?= =?..?=` decodes as one concatenated unit.
fn join_adjacent_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    loop {
        match rest.find("?=") {
            None => {
                out.push_str(rest);
                return out;
            }
            Some(pos) => {
                let after = pos + 2;
                out.push_str(&rest[..after]);
                let tail = &rest[after..];
                let trimmed = tail.trim_start();
                if trimmed.len() != tail.len() && trimmed.starts_with("=?") {
                    rest = trimmed;
                } else {
                    rest = tail;
                }
            }
        }
    }
}

/// Try to decode one encoded-word at the start of `s` (which begins with
/// `=?`). Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(s: &str) -> Option<(String, usize)> {
    let body = &s[2..];
    let charset_end = body.find('?')?;
    let charset_label = &body[..charset_end];

    let encoding = body[charset_end + 1..].chars().next()?;
    if body.as_bytes().get(charset_end + 2) != Some(&b'?') {
        return None;
    }

    let payload_start = charset_end + 3;
    let payload_len = body.get(payload_start..)?.find("?=")?;
    let payload = &body[payload_start..payload_start + payload_len];

    let bytes = match encoding.to_ascii_uppercase() {
        'B' => BASE64.decode(payload).ok()?,
        'Q' => decode_quoted_printable(payload),
        _ => return None,
    };

    let text = Charset::from_label(charset_label).decode(&bytes);
    Some((text, 2 + payload_start + payload_len + 2))
}

/// Q-encoding: `=XX` hex escapes, `_` is a space, everything else literal.
fn decode_quoted_printable(payload: &str) -> Vec<u8> {
    let raw = payload.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => {
                if let (Some(&h), Some(&l)) = (raw.get(i + 1), raw.get(i + 2)) {
                    match (hex_value(h), hex_value(l)) {
                        (Some(hi), Some(lo)) => {
                            out.push(hi * 16 + lo);
                            i += 3;
                        }
                        _ => {
                            out.push(b'=');
                            i += 1;
                        }
                    }
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_cyrillic_subject() {
        assert_eq!(
            decode_header_value("=?UTF-8?B?0LrQuNGA0LjQu9C70LjRhtCw?="),
            "кириллица"
        );
    }

    #[test]
    fn test_q_encoding_underscore_is_space() {
        assert_eq!(decode_header_value("=?UTF-8?Q?hello_world?="), "hello world");
    }

    #[test]
    fn test_q_encoding_hex_escapes() {
        assert_eq!(
            decode_header_value("=?windows-1251?Q?=CF=F0=E8=E2=E5=F2?="),
            "Привет"
        );
    }

    #[test]
    fn test_adjacent_words_join_without_space() {
        assert_eq!(
            decode_header_value("=?UTF-8?Q?foo?= =?UTF-8?Q?bar?="),
            "foobar"
        );
        assert_eq!(
            decode_header_value("=?UTF-8?Q?foo?=\r\n =?UTF-8?Q?bar?="),
            "foobar"
        );
    }

    #[test]
    fn test_plain_text_between_words_is_kept() {
        assert_eq!(
            decode_header_value("prefix =?UTF-8?Q?mid?= suffix"),
            "prefix mid suffix"
        );
    }

    #[test]
    fn test_malformed_word_passes_through() {
        assert_eq!(decode_header_value("=?broken"), "=?broken");
        assert_eq!(decode_header_value("no words here"), "no words here");
    }

    #[test]
    fn test_unknown_encoding_letter_is_untouched() {
        assert_eq!(decode_header_value("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_lowercase_encoding_letters() {
        assert_eq!(decode_header_value("=?utf-8?q?a_b?="), "a b");
        assert_eq!(
            decode_header_value("=?utf-8?b?0LrQuNGA0LjQu9C70LjRhtCw?="),
            "кириллица"
        );
    }
}
