//! Collection and aggregation engine for repo-stats.
//!
//! Responsible for the on-disk record cache, resumable incremental
//! collection from a [`collector::RecordSource`], and the time-series
//! aggregation that turns records into cumulative, open and monthly series.

pub mod aggregator;
pub mod analysis;
pub mod cache;
pub mod collector;

pub use stats_core as core;
