//! Checkpointed on-disk cache of collected records.
//!
//! One JSON file per tracked source lives under the cache directory. Saves go
//! through a temporary sibling file followed by a rename so that a crash
//! mid-write never leaves a truncated snapshot behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stats_core::error::{Result, StatsError};
use stats_core::models::{CacheSnapshot, Record, RecordKind};
use stats_core::time_utils::{format_timestamp, rfc3339, rfc3339_option};
use tracing::{debug, warn};

// ── On-disk layout ────────────────────────────────────────────────────────────

/// Cache file as read from disk.
///
/// `checkpoint` is informational only; the snapshot recomputes it from the
/// records. `issues` / `prs` hold the older split layout, which is merged into
/// `records` on load and never written back.
#[derive(Debug, Default, Deserialize)]
struct CacheFile {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    checkpoint: Option<u64>,
    #[serde(default, with = "rfc3339_option")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    issues: Vec<LegacyItem>,
    #[serde(default)]
    prs: Vec<LegacyItem>,
}

/// Cache file as written to disk, borrowing from the snapshot.
#[derive(Debug, Serialize)]
struct CacheFileRef<'a> {
    records: Vec<&'a Record>,
    checkpoint: u64,
    last_updated: Option<String>,
}

/// Item of the split `issues` / `prs` layout.
#[derive(Debug, Deserialize)]
struct LegacyItem {
    #[serde(alias = "id")]
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(with = "rfc3339")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_option")]
    closed_at: Option<DateTime<Utc>>,
}

impl LegacyItem {
    fn into_record(self, kind: RecordKind) -> Record {
        Record::new(self.number, kind, self.created_at)
            .with_closed_at(self.closed_at)
            .with_label(self.title)
    }
}

// ── CacheStore ────────────────────────────────────────────────────────────────

/// Persists one [`CacheSnapshot`] per source id under a cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// File backing `source_id`: `<dir>/<source_id with '/' as '_'>_cache.json`.
    pub fn cache_path(&self, source_id: &str) -> PathBuf {
        let safe: String = source_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                other => other,
            })
            .collect();
        self.cache_dir.join(format!("{safe}_cache.json"))
    }

    /// Load the snapshot for `source_id`.
    ///
    /// A missing file yields an empty snapshot. A file that exists but cannot
    /// be parsed is [`StatsError::CacheCorrupt`]; it is never replaced with
    /// an empty cache.
    pub fn load(&self, source_id: &str) -> Result<CacheSnapshot> {
        let path = self.cache_path(source_id);
        if !path.exists() {
            debug!(path = %path.display(), "no cache file; starting empty");
            return Ok(CacheSnapshot::empty());
        }

        let content = fs::read_to_string(&path).map_err(|source| StatsError::FileRead {
            path: path.clone(),
            source,
        })?;

        let file: CacheFile = serde_json::from_str(&content).map_err(|source| {
            StatsError::CacheCorrupt {
                path: path.clone(),
                source,
            }
        })?;

        let stored_checkpoint = file.checkpoint;
        let total = file.records.len() + file.issues.len() + file.prs.len();

        let records = file
            .records
            .into_iter()
            .chain(file.issues.into_iter().map(|i| i.into_record(RecordKind::Issue)))
            .chain(file.prs.into_iter().map(|i| i.into_record(RecordKind::PullRequest)));
        let snapshot = CacheSnapshot::from_records(records, file.last_updated);

        if snapshot.len() != total {
            warn!(
                path = %path.display(),
                duplicates = total - snapshot.len(),
                "cache file repeats record ids; keeping first occurrence"
            );
        }
        if let Some(stored) = stored_checkpoint {
            if stored != snapshot.checkpoint() {
                warn!(
                    path = %path.display(),
                    stored,
                    recomputed = snapshot.checkpoint(),
                    "stale checkpoint in cache file; using recomputed value"
                );
            }
        }

        debug!(
            path = %path.display(),
            records = snapshot.len(),
            checkpoint = snapshot.checkpoint(),
            "loaded cache"
        );
        Ok(snapshot)
    }

    /// Atomically write `snapshot` for `source_id`, creating the cache
    /// directory when needed.
    pub fn save(&self, source_id: &str, snapshot: &CacheSnapshot) -> Result<()> {
        let path = self.cache_path(source_id);
        fs::create_dir_all(&self.cache_dir).map_err(|source| StatsError::FileWrite {
            path: self.cache_dir.clone(),
            source,
        })?;

        let file = CacheFileRef {
            records: snapshot.sorted_records(),
            checkpoint: snapshot.checkpoint(),
            last_updated: snapshot.last_updated().as_ref().map(format_timestamp),
        };
        let json = serde_json::to_string_pretty(&file)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, json.as_bytes()).map_err(|source| StatsError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &path) {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %e, "could not remove temporary cache file");
            }
            return Err(StatsError::FileWrite { path, source });
        }

        debug!(
            path = %path.display(),
            records = snapshot.len(),
            checkpoint = snapshot.checkpoint(),
            "saved cache"
        );
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
