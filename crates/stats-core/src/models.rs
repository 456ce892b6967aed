use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StatsError};
use crate::time_utils::{rfc3339, rfc3339_option};

/// What a [`Record`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A GitHub issue.
    Issue,
    /// A GitHub pull request.
    PullRequest,
    /// First commit that added a file under a new module directory.
    ModuleAdded,
    /// First commit attributed to a contributor (committer or co-author).
    ContributorSeen,
}

impl RecordKind {
    /// Every kind, in display order.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Issue,
        RecordKind::PullRequest,
        RecordKind::ModuleAdded,
        RecordKind::ContributorSeen,
    ];

    /// Stable snake_case identifier, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Issue => "issue",
            RecordKind::PullRequest => "pull_request",
            RecordKind::ModuleAdded => "module_added",
            RecordKind::ContributorSeen => "contributor_seen",
        }
    }

    /// Plural noun used for exported file and column names.
    pub fn plural(self) -> &'static str {
        match self {
            RecordKind::Issue => "issues",
            RecordKind::PullRequest => "prs",
            RecordKind::ModuleAdded => "modules",
            RecordKind::ContributorSeen => "contributors",
        }
    }

    /// Whether records of this kind can ever carry a `closed_at`.
    pub fn is_closable(self) -> bool {
        matches!(self, RecordKind::Issue | RecordKind::PullRequest)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trackable, event-bearing item.
///
/// For the commit-mining kinds `created_at` is the instant the module or
/// contributor was first seen and `closed_at` is always `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Source-assigned id, unique and increasing in source order.
    #[serde(alias = "number")]
    pub id: u64,
    pub kind: RecordKind,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_option")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Issue/PR title, module name or contributor display name.
    #[serde(default, alias = "title")]
    pub label: String,
}

impl Record {
    /// An open record with an empty label.
    pub fn new(id: u64, kind: RecordKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            created_at,
            closed_at: None,
            label: String::new(),
        }
    }

    pub fn with_closed_at(mut self, closed_at: Option<DateTime<Utc>>) -> Self {
        self.closed_at = closed_at;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Observation instant for commit-derived facts.
    pub fn seen_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Fails with [`StatsError::DataIntegrityViolation`] when the record
    /// closes before it was created.
    pub fn validate(&self) -> Result<()> {
        match self.closed_at {
            Some(closed) if closed < self.created_at => Err(StatsError::DataIntegrityViolation {
                record_ids: vec![self.id],
                reason: format!(
                    "closed_at {} precedes created_at {}",
                    closed.to_rfc3339(),
                    self.created_at.to_rfc3339()
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Everything persisted for one tracked entity: the records seen so far plus
/// the resumption checkpoint derived from them.
///
/// The checkpoint is never stored independently of the records; it is kept
/// equal to the largest id present on every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    records: HashMap<u64, Record>,
    checkpoint: u64,
    last_updated: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// An empty snapshot with checkpoint 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from loose records. When an id repeats, the first
    /// occurrence wins.
    pub fn from_records(
        records: impl IntoIterator<Item = Record>,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        let mut snapshot = Self {
            last_updated,
            ..Self::default()
        };
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Insert a record unless its id is already present.
    ///
    /// Returns `true` when the record was added.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.checkpoint = self.checkpoint.max(record.id);
        self.records.insert(record.id, record);
        true
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    /// Highest record id present, or 0 when empty.
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Stamp the snapshot with the time it is being persisted.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Records ordered by id ascending.
    pub fn sorted_records(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Records of a single kind, ordered by id ascending.
    pub fn records_of_kind(&self, kind: RecordKind) -> Vec<Record> {
        self.sorted_records()
            .into_iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of records per kind; kinds with no records are absent.
    pub fn count_by_kind(&self) -> HashMap<RecordKind, usize> {
        let mut counts = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }
}
