mod bootstrap;
mod export;

use anyhow::{Context, Result};
use stats_core::models::RecordKind;
use stats_core::settings::{Command, Settings};
use stats_data::analysis::analyze;
use stats_data::cache::CacheStore;
use stats_data::collector::IncrementalCollector;
use stats_sources::{GitHubSource, GitLogSource};

const GITHUB_KINDS: &[RecordKind] = &[RecordKind::Issue, RecordKind::PullRequest];
const GIT_KINDS: &[RecordKind] = &[RecordKind::ModuleAdded, RecordKind::ContributorSeen];

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("repo-stats v{} starting", env!("CARGO_PKG_VERSION"));

    let cache_dir = match &settings.cache_dir {
        Some(dir) => dir.clone(),
        None if settings.no_cache => bootstrap::default_cache_dir(),
        None => bootstrap::ensure_directories()?,
    };
    let collector =
        IncrementalCollector::new(CacheStore::new(cache_dir), settings.checkpoint_interval())?;

    let source_id = settings.source_id();
    let use_cache = !settings.no_cache;

    let (collection, kinds) = match &settings.command {
        Command::Github { repo, token } => {
            let source = GitHubSource::new(repo, token.clone())?;
            source
                .check_access()
                .with_context(|| format!("cannot access repository {repo}"))?;
            let collection = collector
                .collect(&source, &source_id, use_cache)
                .with_context(|| format!("collecting issues and pull requests for {repo}"))?;
            (collection, GITHUB_KINDS)
        }
        Command::Git { path, modules_dir } => {
            let source = GitLogSource::new(path, modules_dir.clone())?;
            let collection = collector
                .collect(&source, &source_id, use_cache)
                .with_context(|| format!("mining commit history in {}", path.display()))?;
            (collection, GIT_KINDS)
        }
    };

    tracing::info!(
        cached = collection.cached,
        new = collection.new_records,
        saves = collection.saves,
        "records ready"
    );

    let report = analyze(&collection.snapshot, kinds).context("deriving time series")?;
    let written = export::write_report(&report, &settings.output_dir).with_context(|| {
        format!("writing CSV files to {}", settings.output_dir.display())
    })?;

    println!("{source_id}: {} records ({} new)", collection.snapshot.len(), collection.new_records);
    for (kind, stats) in &report.kinds {
        if kind.is_closable() {
            println!("  {}: {} ({} open)", kind.plural(), stats.records.len(), stats.open_count());
        } else {
            println!("  {}: {}", kind.plural(), stats.records.len());
        }
    }
    for path in &written {
        println!("  wrote {}", path.display());
    }

    Ok(())
}
