//! Shared foundations for repo-stats.
//!
//! Holds the error taxonomy, the record and cache-snapshot model, timestamp
//! helpers and the command-line settings used by every other crate in the
//! workspace.

pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{Result, StatsError};
pub use models::{CacheSnapshot, Record, RecordKind};
