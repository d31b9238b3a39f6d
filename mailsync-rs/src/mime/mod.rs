//! MIME header decoding
//!
//! Provides the decoding applied to From/To/Subject header values:
//! - [`encoded_word`]: RFC 2047 encoded-word decoding (B and Q payloads)
//! - [`charset`]: static charset tables (UTF-8, Windows-1251, KOI8-R,
//!   Latin-1, permissive fallback)

pub mod charset;
pub mod encoded_word;

pub use charset::Charset;
pub use encoded_word::decode_header_value;
