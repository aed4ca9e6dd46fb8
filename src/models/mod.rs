//! Data models for the file hub.
//!
//! - `bucket`, `object`, `metadata` map to the local store's SQLite tables.
//! - `file` is the tag scheme every stored file carries and the view of it
//!   handed back to callers.
//! - `upload` holds the values exchanged with the upload orchestrator.

pub mod bucket;
pub mod file;
pub mod metadata;
pub mod object;
pub mod upload;
