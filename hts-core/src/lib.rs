//! Shared core of the SRE toolkit.
//!
//! Holds the data model both the scheduler and the load-test engine write
//! to the document store, the shared error type, and the HTTP client
//! builder used by both.

pub mod httpclient;
pub mod types;
