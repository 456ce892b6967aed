use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the repository statistics crates.
#[derive(Error, Debug)]
pub enum StatsError {
    /// The upstream event source failed outright (auth, network, not found,
    /// rate limit). Never retried internally.
    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A persisted cache snapshot exists but could not be parsed.
    #[error("Cache file {path} is corrupt: {source}")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Record data contradicts itself (closed before created, or an open
    /// balance that would go negative).
    #[error("Data integrity violation for record(s) {record_ids:?}: {reason}")]
    DataIntegrityViolation { record_ids: Vec<u64>, reason: String },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written to disk.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StatsError {
    /// Shorthand for [`StatsError::SourceUnavailable`].
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the statistics crates.
pub type Result<T> = std::result::Result<T, StatsError>;
