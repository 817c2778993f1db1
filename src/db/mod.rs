//! Database module for kumasync.
//!
//! Read-only SQLite access to heartbeats and per-account settings rows.

mod models;
mod store;

pub use models::*;
pub use store::*;
