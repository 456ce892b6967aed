//! Time-series aggregation over collected records.
//!
//! Three pure computations, each independent of input order:
//!
//! * cumulative-created: one point per record, counting up in creation order;
//! * open-over-time: a sweep over creation (+1) and closure (-1) events;
//! * monthly-new: sparse per-calendar-month creation counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use stats_core::error::{Result, StatsError};
use stats_core::models::Record;
use stats_core::time_utils::month_start_of;

// ── Series types ──────────────────────────────────────────────────────────────

/// One `(timestamp, count)` sample of a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

impl SeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, count: u64) -> Self {
        Self { timestamp, count }
    }
}

/// Points sorted non-decreasing by timestamp.
pub type Series = Vec<SeriesPoint>;

/// All three series derived from one record set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedSeries {
    pub cumulative_created: Series,
    pub open_over_time: Series,
    pub monthly_new: Series,
}

/// Whether an open-balance event opens or closes a record. Opening sorts
/// first at an identical instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    Opened,
    Closed,
}

// ── TimeSeriesAggregator ──────────────────────────────────────────────────────

/// Stateless helper that turns records into derived time series.
pub struct TimeSeriesAggregator;

impl TimeSeriesAggregator {
    /// Records in creation order: `created_at` ascending, ties by id.
    pub fn creation_order(records: &[Record]) -> Vec<&Record> {
        let mut ordered: Vec<&Record> = records.iter().collect();
        ordered.sort_by_key(|r| (r.created_at, r.id));
        ordered
    }

    /// Running count of created records, one point per record.
    pub fn cumulative_created(records: &[Record]) -> Series {
        Self::creation_order(records)
            .into_iter()
            .zip(1u64..)
            .map(|(record, count)| SeriesPoint::new(record.created_at, count))
            .collect()
    }

    /// Number of records open after each creation or closure event.
    ///
    /// Events are ordered by timestamp, then openings before closings, then
    /// record id. Fails with [`StatsError::DataIntegrityViolation`] when any
    /// record closes before it was created or the balance would go negative.
    pub fn open_over_time(records: &[Record]) -> Result<Series> {
        let invalid: Vec<u64> = {
            let mut ids: Vec<u64> = records
                .iter()
                .filter(|r| r.validate().is_err())
                .map(|r| r.id)
                .collect();
            ids.sort_unstable();
            ids
        };
        if !invalid.is_empty() {
            return Err(StatsError::DataIntegrityViolation {
                record_ids: invalid,
                reason: "closed_at precedes created_at".to_string(),
            });
        }

        let mut events: Vec<(DateTime<Utc>, EventKind, u64)> =
            Vec::with_capacity(records.len() * 2);
        for record in records {
            events.push((record.created_at, EventKind::Opened, record.id));
            if let Some(closed_at) = record.closed_at {
                events.push((closed_at, EventKind::Closed, record.id));
            }
        }
        events.sort_unstable();

        let mut balance: u64 = 0;
        let mut series = Series::with_capacity(events.len());
        for (timestamp, kind, id) in events {
            balance = match kind {
                EventKind::Opened => balance + 1,
                EventKind::Closed => {
                    balance
                        .checked_sub(1)
                        .ok_or_else(|| StatsError::DataIntegrityViolation {
                            record_ids: vec![id],
                            reason: format!(
                                "open balance would go negative at {}",
                                timestamp.to_rfc3339()
                            ),
                        })?
                }
            };
            series.push(SeriesPoint::new(timestamp, balance));
        }

        Ok(series)
    }

    /// Records created per calendar month (UTC), keyed by the first instant
    /// of the month. Months without records are omitted.
    pub fn monthly_new(records: &[Record]) -> Series {
        // Use BTreeMap for automatically sorted keys.
        let mut months: BTreeMap<(i32, u32), u64> = BTreeMap::new();
        for record in records {
            let key = (record.created_at.year(), record.created_at.month());
            *months.entry(key).or_insert(0) += 1;
        }

        months
            .into_iter()
            .filter_map(|((year, month), count)| {
                month_start_of(year, month).map(|start| SeriesPoint::new(start, count))
            })
            .collect()
    }

    /// Compute all three series for `records`.
    pub fn derive(records: &[Record]) -> Result<DerivedSeries> {
        Ok(DerivedSeries {
            cumulative_created: Self::cumulative_created(records),
            open_over_time: Self::open_over_time(records)?,
            monthly_new: Self::monthly_new(records),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
