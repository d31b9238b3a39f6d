//! Minimal IMAP4rev1 client
//!
//! Implements exactly the slice of the protocol the sync engine needs,
//! directly on a TLS socket:
//!
//! - [`transport`]: TLS connection with connect timeout
//! - [`session`]: tagged-command engine (tags, buffer, deadlines)
//! - [`auth`]: AUTHENTICATE PLAIN with LOGIN fallback
//! - [`folders`]: LIST parsing and sent-folder discovery
//! - [`fetch`]: SEARCH/FETCH grammar helpers
//! - [`parser`]: FETCH response and header-block parsing

pub mod auth;
pub mod fetch;
pub mod folders;
pub mod parser;
pub mod session;
pub mod transport;

pub use folders::{Direction, LocalFolder, SyncFolder};
pub use parser::CandidateMessage;
pub use session::{CommandReply, ImapSession, Status};
