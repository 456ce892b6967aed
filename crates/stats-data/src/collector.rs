//! Resumable, checkpointed record collection.
//!
//! The collector merges a source's records into the cached snapshot for that
//! source. Anything at or below the snapshot's checkpoint is skipped, new
//! records are accumulated, and the merged snapshot is saved every
//! `checkpoint_interval` new records plus once more at the end. A source
//! failure aborts the run; the next run resumes from the last saved
//! checkpoint and re-skips whatever was already committed.

use std::collections::HashMap;

use chrono::Utc;
use stats_core::error::{Result, StatsError};
use stats_core::models::{CacheSnapshot, Record, RecordKind};
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Lazily produced records; each item may fail independently (for example a
/// later page of a paginated API).
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

/// An external, roughly id-ordered supplier of records.
///
/// Implementations own pagination, authentication and any retry policy. The
/// checkpoint is a hint: a source may return records at or below it and the
/// collector will skip them.
pub trait RecordSource {
    /// Records with ids greater than `checkpoint`, in ascending id order as
    /// far as the source can guarantee.
    fn records_since(&self, checkpoint: u64) -> Result<RecordStream<'_>>;

    /// Records not yet in `known`.
    ///
    /// Sources whose ids are stable use the default, which asks for
    /// everything above the snapshot's checkpoint. Sources that can only
    /// recognise known items by content override this and number new items
    /// above `known.checkpoint()`.
    fn records_after(&self, known: &CacheSnapshot) -> Result<RecordStream<'_>> {
        self.records_since(known.checkpoint())
    }
}

// ── Collection ────────────────────────────────────────────────────────────────

/// Outcome of one [`IncrementalCollector::collect`] run.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Cached and newly collected records merged together.
    pub snapshot: CacheSnapshot,
    /// Records that were already in the cache when the run started.
    pub cached: usize,
    /// Items pulled from the source.
    pub fetched: usize,
    /// Records added by this run.
    pub new_records: usize,
    /// Items dropped as already seen.
    pub skipped: usize,
    /// Successful cache writes, including the final one.
    pub saves: usize,
    /// New records per kind.
    pub new_by_kind: HashMap<RecordKind, usize>,
}

impl Collection {
    /// Merged records ordered by id.
    pub fn records(&self) -> Vec<&Record> {
        self.snapshot.sorted_records()
    }
}

// ── IncrementalCollector ──────────────────────────────────────────────────────

/// Merges source records into a [`CacheStore`] snapshot with periodic saves.
#[derive(Debug, Clone)]
pub struct IncrementalCollector {
    store: CacheStore,
    checkpoint_interval: usize,
}

impl IncrementalCollector {
    /// `checkpoint_interval` must be at least 1.
    pub fn new(store: CacheStore, checkpoint_interval: usize) -> Result<Self> {
        if checkpoint_interval == 0 {
            return Err(StatsError::Config(
                "checkpoint interval must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store,
            checkpoint_interval,
        })
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    /// Pull everything new from `source` and merge it with the cache for
    /// `source_id`.
    ///
    /// With `use_cache == false` the run starts from an empty snapshot and
    /// never touches the cache file.
    pub fn collect(
        &self,
        source: &dyn RecordSource,
        source_id: &str,
        use_cache: bool,
    ) -> Result<Collection> {
        let mut merged = if use_cache {
            self.store.load(source_id)?
        } else {
            CacheSnapshot::empty()
        };

        let checkpoint = merged.checkpoint();
        let cached = merged.len();
        info!(
            source = source_id,
            cached,
            checkpoint,
            "fetching records newer than checkpoint"
        );

        let mut fetched = 0usize;
        let mut new_records = 0usize;
        let mut skipped = 0usize;
        let mut saves = 0usize;
        let mut new_by_kind: HashMap<RecordKind, usize> = HashMap::new();

        for item in source.records_after(&merged)? {
            let record = item?;
            fetched += 1;

            if record.id <= checkpoint || merged.contains(record.id) {
                skipped += 1;
                continue;
            }

            *new_by_kind.entry(record.kind).or_insert(0) += 1;
            merged.insert(record);
            new_records += 1;

            if new_records % self.checkpoint_interval == 0 {
                info!(
                    source = source_id,
                    fetched,
                    new = new_records,
                    "checkpoint reached"
                );
                if use_cache {
                    self.persist(source_id, &mut merged)?;
                    saves += 1;
                }
            }
        }

        if use_cache {
            self.persist(source_id, &mut merged)?;
            saves += 1;
        }

        for (kind, count) in &new_by_kind {
            debug!(source = source_id, kind = %kind, count, "new records by kind");
        }
        info!(
            source = source_id,
            total = merged.len(),
            new = new_records,
            skipped,
            "collection complete"
        );

        Ok(Collection {
            snapshot: merged,
            cached,
            fetched,
            new_records,
            skipped,
            saves,
            new_by_kind,
        })
    }

    fn persist(&self, source_id: &str, snapshot: &mut CacheSnapshot) -> Result<()> {
        snapshot.touch(Utc::now());
        self.store.save(source_id, snapshot)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
