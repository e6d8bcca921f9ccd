//! Shared config-file parsing and logging support used by all three roles.
//!
//! - [`endpoint`] — cached hostname resolution
//! - [`forwarding`] — emulator forwarding-table parsing and lookup
//! - [`tracker`] — requester `tracker.txt` parsing
//! - [`losslog`] — emulator structured loss-event log

pub mod endpoint;
pub mod forwarding;
pub mod losslog;
pub mod tracker;
