use std::path::{Path, PathBuf};

use stats_core::error::{Result, StatsError};
use stats_core::models::RecordKind;
use stats_core::time_utils::format_timestamp;
use stats_data::aggregator::{Series, TimeSeriesAggregator};
use stats_data::analysis::{KindStats, StatsReport};
use tracing::debug;

// ── CSV export ─────────────────────────────────────────────────────────────────

/// Write every series in `report` as CSV under `output_dir`, creating it if
/// needed. Returns the written paths in kind order.
///
/// Issue and PR kinds get `_created_over_time`, `_open_over_time` and
/// `_monthly_new` files. Module and contributor kinds get a labelled
/// `_over_time` file naming the record behind each step, plus `_monthly_new`.
pub fn write_report(report: &StatsReport, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|source| StatsError::FileWrite {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (&kind, stats) in &report.kinds {
        let prefix = kind.plural();

        if kind.is_closable() {
            let path = output_dir.join(format!("{prefix}_created_over_time.csv"));
            write_series(
                &path,
                ["date", &format!("cumulative_{prefix}_created")],
                &stats.series.cumulative_created,
            )?;
            written.push(path);

            let path = output_dir.join(format!("{prefix}_open_over_time.csv"));
            write_series(
                &path,
                ["date", &format!("{prefix}_open")],
                &stats.series.open_over_time,
            )?;
            written.push(path);
        } else {
            let path = output_dir.join(format!("{prefix}_over_time.csv"));
            write_labelled(&path, kind, stats)?;
            written.push(path);
        }

        let path = output_dir.join(format!("{prefix}_monthly_new.csv"));
        write_series(
            &path,
            ["month_start", &format!("new_{prefix}")],
            &stats.series.monthly_new,
        )?;
        written.push(path);
    }

    Ok(written)
}

fn label_column(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::ModuleAdded => "module_name",
        RecordKind::ContributorSeen => "contributor_name",
        RecordKind::Issue | RecordKind::PullRequest => "title",
    }
}

fn write_series(path: &Path, header: [&str; 2], series: &Series) -> Result<()> {
    let rows = series
        .iter()
        .map(|p| vec![format_timestamp(&p.timestamp), p.count.to_string()]);
    write_csv(path, &header, rows)
}

/// The cumulative-created series with the label of the record behind each
/// point. Points are in creation order, one per record.
fn write_labelled(path: &Path, kind: RecordKind, stats: &KindStats) -> Result<()> {
    let count_column = format!("cumulative_{}", kind.plural());
    let header: [&str; 3] = ["date", &count_column, label_column(kind)];
    let rows = TimeSeriesAggregator::creation_order(&stats.records)
        .into_iter()
        .zip(&stats.series.cumulative_created)
        .map(|(record, point)| {
            vec![
                format_timestamp(&point.timestamp),
                point.count.to_string(),
                record.label.clone(),
            ]
        });
    write_csv(path, &header, rows)
}

fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let to_write_error = |e: csv::Error| StatsError::FileWrite {
        path: path.to_path_buf(),
        source: e.into(),
    };

    let mut writer = csv::Writer::from_path(path).map_err(to_write_error)?;
    writer.write_record(header).map_err(to_write_error)?;
    let mut rows_written = 0usize;
    for row in rows {
        writer.write_record(&row).map_err(to_write_error)?;
        rows_written += 1;
    }
    writer.flush().map_err(|source| StatsError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), rows = rows_written, "wrote csv");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
