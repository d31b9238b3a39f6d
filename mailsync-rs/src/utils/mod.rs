//! Utility functions
//!
//! - [`email`]: address extraction and Date header parsing

pub mod email;

pub use email::{extract_email_address, parse_date_header};
