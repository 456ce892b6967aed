//! Per-kind statistics over a merged record set.
//!
//! Splits a [`CacheSnapshot`] by [`RecordKind`] and runs the
//! [`TimeSeriesAggregator`] for every requested kind, returning a
//! [`StatsReport`] ready for export.

use std::collections::BTreeMap;

use stats_core::error::Result;
use stats_core::models::{CacheSnapshot, Record, RecordKind};
use tracing::info;

use crate::aggregator::{DerivedSeries, TimeSeriesAggregator};

/// Series and backing records for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStats {
    /// Records of this kind, ordered by id.
    pub records: Vec<Record>,
    pub series: DerivedSeries,
}

impl KindStats {
    pub fn open_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_open()).count()
    }
}

/// Statistics for every requested kind, in [`RecordKind`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub kinds: BTreeMap<RecordKind, KindStats>,
}

impl StatsReport {
    pub fn get(&self, kind: RecordKind) -> Option<&KindStats> {
        self.kinds.get(&kind)
    }
}

/// Derive the three series for each kind in `kinds`.
///
/// Kinds without any records still appear, with empty series.
pub fn analyze(snapshot: &CacheSnapshot, kinds: &[RecordKind]) -> Result<StatsReport> {
    let mut report = StatsReport::default();

    for &kind in kinds {
        let records = snapshot.records_of_kind(kind);
        let series = TimeSeriesAggregator::derive(&records)?;
        let stats = KindStats { records, series };

        info!(
            kind = %kind,
            records = stats.records.len(),
            open = stats.open_count(),
            months = stats.series.monthly_new.len(),
            "calculated statistics"
        );
        report.kinds.insert(kind, stats);
    }

    Ok(report)
}
