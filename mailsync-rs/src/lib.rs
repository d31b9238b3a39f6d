//! mailsync-rs: mailbox synchronization engine
//!
//! A minimal IMAP4rev1 client built directly on a TLS socket — no IMAP
//! library — that pulls recent message headers into the CRM store.
//!
//! # Features
//!
//! - **Handshake**: greeting check, CAPABILITY, AUTHENTICATE PLAIN with
//!   LOGIN fallback
//! - **Folder discovery**: live LIST parsing with a localized sent-folder
//!   heuristic
//! - **Header sync**: SEARCH SINCE window, batched FETCH of
//!   UID/size/headers, RFC 2047 and charset decoding
//! - **Dedup & correlation**: append-only external keys, contact matching
//!   by address
//!
//! # Example
//!
//! ```no_run
//! use mailsync_rs::config::Config;
//! use mailsync_rs::storage::MessageStore;
//! use mailsync_rs::sync::{SyncEngine, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = MessageStore::new(&config.storage.database_url).await?;
//!
//!     let engine = SyncEngine::new(store, config.sync);
//!     let report = engine.sync_account(1, &SyncOptions::default()).await?;
//!
//!     println!("{} new messages", report.inserted);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`imap`]: IMAP client (transport, session, auth, parsing)
//! - [`mime`]: RFC 2047 and charset decoding
//! - [`storage`]: SQLite persistence
//! - [`sync`]: The run orchestrator
//! - [`utils`]: Address and date helpers

pub mod config;
pub mod error;
pub mod imap;
pub mod mime;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SyncError, SyncWarning};
pub use storage::MessageStore;
pub use sync::{SyncEngine, SyncOptions, SyncReport};
