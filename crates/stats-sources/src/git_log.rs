//! Commit-history facts from a local git checkout.
//!
//! Walks `git log` oldest-first and emits two kinds of fact:
//!
//! * [`RecordKind::ModuleAdded`]: the first commit adding a file under a new
//!   child of the configured modules directory;
//! * [`RecordKind::ContributorSeen`]: the first commit by a committer, or the
//!   first mention of a `Co-authored-by` trailer.
//!
//! A fact's identity is its module or contributor name, not its position in
//! history: merging a branch with older commits inserts facts in the middle
//! of the traversal. New facts are therefore matched against the cached
//! snapshot by name and numbered above its checkpoint.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use stats_core::error::{Result, StatsError};
use stats_core::models::{CacheSnapshot, Record, RecordKind};
use stats_core::time_utils::parse_timestamp;
use stats_data::collector::{RecordSource, RecordStream};
use tracing::{debug, info};

use crate::coauthors::{contributor_display_name, contributor_name_from_label, extract_coauthors};

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// hash, committer name, committer email, strict ISO committer date, raw
/// body; name-status lines follow the final separator.
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%cn%x1f%ce%x1f%cI%x1f%B%x1f";

/// One commit as far as fact mining is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub committer_name: String,
    pub committer_email: String,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    /// Paths this commit added (status `A`).
    pub added_paths: Vec<String>,
}

/// Parse output produced with [`LOG_FORMAT`] and `--name-status`.
pub fn parse_git_log(output: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();

    for chunk in output.split(RECORD_SEP) {
        if chunk.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = chunk.splitn(6, FIELD_SEP).collect();
        let [hash, name, email, date, message, files] = fields.as_slice() else {
            return Err(StatsError::Other(anyhow::anyhow!(
                "unexpected git log record with {} fields",
                fields.len()
            )));
        };

        let added_paths = files
            .lines()
            .filter_map(|line| {
                let (status, path) = line.trim_end().split_once('\t')?;
                (status == "A").then(|| path.to_string())
            })
            .collect();

        commits.push(CommitInfo {
            hash: hash.trim().to_string(),
            committer_name: name.trim().to_string(),
            committer_email: email.trim().to_string(),
            committed_at: parse_timestamp(date)?,
            message: message.to_string(),
            added_paths,
        });
    }

    Ok(commits)
}

/// Module a path belongs to: the first component under `modules_dir`, cut at
/// the first `/` or `.`.
pub fn module_name(path: &str, modules_dir: &str) -> Option<String> {
    let dir = modules_dir.trim_matches('/');
    let rest = path.strip_prefix(dir)?.strip_prefix('/')?;
    let name: String = rest.chars().take_while(|c| *c != '/' && *c != '.').collect();
    (!name.is_empty()).then_some(name)
}

/// A first-seen module or contributor, not yet numbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub kind: RecordKind,
    /// Identity across runs: the module name or the contributor's name.
    pub key: String,
    pub label: String,
    pub seen_at: DateTime<Utc>,
}

impl Fact {
    fn new(kind: RecordKind, key: &str, label: String, seen_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            key: key.to_string(),
            label,
            seen_at,
        }
    }

    pub fn into_record(self, id: u64) -> Record {
        Record::new(id, self.kind, self.seen_at).with_label(self.label)
    }
}

/// Turn commits (oldest first) into first-seen facts, in traversal order.
pub fn derive_facts(commits: &[CommitInfo], modules_dir: Option<&str>) -> Vec<Fact> {
    let mut modules: HashSet<String> = HashSet::new();
    let mut contributors: HashSet<String> = HashSet::new();
    let mut facts = Vec::new();

    for commit in commits {
        if let Some(dir) = modules_dir {
            for path in &commit.added_paths {
                if let Some(module) = module_name(path, dir) {
                    if modules.insert(module.clone()) {
                        facts.push(Fact::new(
                            RecordKind::ModuleAdded,
                            &module,
                            module.clone(),
                            commit.committed_at,
                        ));
                    }
                }
            }
        }

        let committer = &commit.committer_name;
        if !committer.is_empty() && contributors.insert(committer.clone()) {
            let label = contributor_display_name(committer, &commit.committer_email);
            facts.push(Fact::new(
                RecordKind::ContributorSeen,
                committer,
                label,
                commit.committed_at,
            ));
        }

        for coauthor in extract_coauthors(&commit.message) {
            if contributors.insert(coauthor.clone()) {
                facts.push(Fact::new(
                    RecordKind::ContributorSeen,
                    &coauthor,
                    coauthor.clone(),
                    commit.committed_at,
                ));
            }
        }
    }

    facts
}

/// Identities of the commit facts already held in `known`.
///
/// A contributor label may be `username (Name)` or a bare name depending on
/// which commit was first seen, so both forms are registered.
fn known_keys(known: &CacheSnapshot) -> HashSet<(RecordKind, String)> {
    let mut keys = HashSet::new();
    for kind in [RecordKind::ModuleAdded, RecordKind::ContributorSeen] {
        for record in known.records_of_kind(kind) {
            if kind == RecordKind::ContributorSeen {
                keys.insert((kind, contributor_name_from_label(&record.label).to_string()));
            }
            keys.insert((kind, record.label));
        }
    }
    keys
}

/// Drop facts `known` already holds and number the rest, in traversal
/// order, starting just above `known.checkpoint()`.
pub fn number_new_facts(facts: Vec<Fact>, known: &CacheSnapshot) -> Vec<Record> {
    let keys = known_keys(known);
    facts
        .into_iter()
        .filter(|fact| !keys.contains(&(fact.kind, fact.key.clone())))
        .zip(known.checkpoint() + 1..)
        .map(|(fact, id)| fact.into_record(id))
        .collect()
}

// ── GitLogSource ──────────────────────────────────────────────────────────────

/// Fact source backed by `git log` on a local working tree.
#[derive(Debug, Clone)]
pub struct GitLogSource {
    repo_path: PathBuf,
    modules_dir: Option<String>,
}

impl GitLogSource {
    /// Fails with [`StatsError::SourceUnavailable`] when `repo_path` is not
    /// an existing directory.
    pub fn new(repo_path: impl Into<PathBuf>, modules_dir: Option<String>) -> Result<Self> {
        let repo_path = repo_path.into();
        if !repo_path.exists() {
            return Err(StatsError::source_unavailable(
                repo_path.display().to_string(),
                "path does not exist",
            ));
        }
        if !repo_path.is_dir() {
            return Err(StatsError::source_unavailable(
                repo_path.display().to_string(),
                "path is not a directory",
            ));
        }
        Ok(Self {
            repo_path,
            modules_dir,
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Every commit reachable from HEAD, oldest first.
    pub fn commits(&self) -> Result<Vec<CommitInfo>> {
        let output = self.run_git(&[
            "-c",
            "core.quotepath=off",
            "log",
            "--reverse",
            "--name-status",
            LOG_FORMAT,
        ])?;
        let commits = parse_git_log(&output)?;
        debug!(path = %self.repo_path.display(), commits = commits.len(), "read git history");
        Ok(commits)
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .output()
            .map_err(|e| self.unavailable(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.unavailable(format!("git log failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn unavailable(&self, reason: impl Into<String>) -> StatsError {
        StatsError::source_unavailable(self.repo_path.display().to_string(), reason)
    }
}

impl RecordSource for GitLogSource {
    /// Without a snapshot to match against, every fact is numbered from 1 in
    /// traversal order and `checkpoint` is not used.
    fn records_since(&self, _checkpoint: u64) -> Result<RecordStream<'_>> {
        self.records_after(&CacheSnapshot::empty())
    }

    fn records_after(&self, known: &CacheSnapshot) -> Result<RecordStream<'_>> {
        let facts = derive_facts(&self.commits()?, self.modules_dir.as_deref());
        let total = facts.len();
        let records = number_new_facts(facts, known);
        info!(
            path = %self.repo_path.display(),
            facts = total,
            new = records.len(),
            checkpoint = known.checkpoint(),
            "derived commit facts"
        );
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(day: u32, name: &str, email: &str, message: &str, added: &[&str]) -> CommitInfo {
        CommitInfo {
            hash: format!("{day:040}"),
            committer_name: name.to_string(),
            committer_email: email.to_string(),
            committed_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            message: message.to_string(),
            added_paths: added.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_git_log_output() {
        let output = "\u{1e}aaa\u{1f}Jane Doe\u{1f}jane@example.com\u{1f}2024-01-05T10:00:00+02:00\u{1f}Add fastqc\n\nCo-authored-by: Bob Jones <b@x.org>\n\u{1f}\n\nA\tpkg/modules/fastqc/__init__.py\nM\tREADME.md\n\
                      \u{1e}bbb\u{1f}Bob Jones\u{1f}b@x.org\u{1f}2024-01-06T09:00:00Z\u{1f}Tweak docs\n\u{1f}\n\nM\tREADME.md\n";
        let commits = parse_git_log(output).unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "aaa");
        assert_eq!(commits[0].committer_name, "Jane Doe");
        assert_eq!(
            commits[0].committed_at,
            Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap()
        );
        assert!(commits[0].message.contains("Co-authored-by: Bob Jones"));
        assert_eq!(commits[0].added_paths, vec!["pkg/modules/fastqc/__init__.py"]);
        assert!(commits[1].added_paths.is_empty());
    }

    #[test]
    fn test_parse_git_log_empty() {
        assert!(parse_git_log("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_git_log_bad_date() {
        let output = "\u{1e}aaa\u{1f}Jane\u{1f}j@x.org\u{1f}someday\u{1f}msg\u{1f}\n";
        assert!(matches!(
            parse_git_log(output),
            Err(StatsError::TimestampParse(_))
        ));
    }

    #[test]
    fn test_module_name() {
        assert_eq!(
            module_name("multiqc/modules/fastqc/fastqc.py", "multiqc/modules"),
            Some("fastqc".to_string())
        );
        assert_eq!(
            module_name("multiqc/modules/samtools.py", "multiqc/modules/"),
            Some("samtools".to_string())
        );
        assert_eq!(module_name("multiqc/modulesx/foo.py", "multiqc/modules"), None);
        assert_eq!(module_name("docs/modules/fastqc.md", "multiqc/modules"), None);
        assert_eq!(module_name("multiqc/modules/.hidden", "multiqc/modules"), None);
    }

    #[test]
    fn test_derive_facts_first_seen_only() {
        let commits = vec![
            commit(
                1,
                "Jane Doe",
                "1+janed@users.noreply.github.com",
                "Add fastqc\n\nCo-authored-by: Bob Jones <b@x.org>",
                &["m/fastqc/__init__.py", "m/fastqc/fastqc.py"],
            ),
            commit(2, "Bob Jones", "b@x.org", "More", &["m/samtools/x.py", "m/fastqc/extra.py"]),
            commit(3, "Jane Doe", "jane@example.com", "Again", &[]),
        ];
        let facts = derive_facts(&commits, Some("m"));

        let summary: Vec<(RecordKind, &str, &str)> = facts
            .iter()
            .map(|f| (f.kind, f.key.as_str(), f.label.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (RecordKind::ModuleAdded, "fastqc", "fastqc"),
                (RecordKind::ContributorSeen, "Jane Doe", "janed (Jane Doe)"),
                (RecordKind::ContributorSeen, "Bob Jones", "Bob Jones"),
                (RecordKind::ModuleAdded, "samtools", "samtools"),
            ]
        );
        assert_eq!(facts[3].seen_at, commits[1].committed_at);

        let records = number_new_facts(facts, &CacheSnapshot::empty());
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(records.iter().all(|r| r.closed_at.is_none()));
    }

    fn history_before_merge() -> Vec<CommitInfo> {
        vec![
            commit(1, "Jane", "jane@example.com", "Add a", &["m/a/x.py"]),
            commit(3, "Carol", "carol@example.com", "Add c", &["m/c/x.py"]),
        ]
    }

    fn history_after_merge() -> Vec<CommitInfo> {
        vec![
            commit(1, "Jane", "jane@example.com", "Add a", &["m/a/x.py"]),
            commit(2, "Bob", "bob@example.com", "Add b", &["m/b/x.py"]),
            commit(3, "Carol", "carol@example.com", "Add c", &["m/c/x.py"]),
            commit(4, "Jane", "jane@example.com", "Merge feat", &[]),
        ]
    }

    #[test]
    fn test_number_new_facts_after_merge_of_older_branch() {
        let first = number_new_facts(
            derive_facts(&history_before_merge(), Some("m")),
            &CacheSnapshot::empty(),
        );
        let known = CacheSnapshot::from_records(first, None);
        assert_eq!(known.checkpoint(), 4);

        let second = number_new_facts(derive_facts(&history_after_merge(), Some("m")), &known);

        let summary: Vec<(u64, RecordKind, &str)> = second
            .iter()
            .map(|r| (r.id, r.kind, r.label.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (5, RecordKind::ModuleAdded, "b"),
                (6, RecordKind::ContributorSeen, "Bob"),
            ]
        );
        assert_eq!(second[0].created_at, history_after_merge()[1].committed_at);
    }

    #[test]
    fn test_number_new_facts_unchanged_history_is_empty() {
        let facts = derive_facts(&history_after_merge(), Some("m"));
        let known = CacheSnapshot::from_records(
            number_new_facts(facts.clone(), &CacheSnapshot::empty()),
            None,
        );
        assert!(number_new_facts(facts, &known).is_empty());
    }

    #[test]
    fn test_number_new_facts_matches_contributor_across_label_forms() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let known = CacheSnapshot::from_records(
            vec![Record::new(3, RecordKind::ContributorSeen, t).with_label("janed (Jane Doe)")],
            None,
        );
        let facts = derive_facts(
            &[commit(2, "Jane Doe", "jane@example.com", "Older commit", &[])],
            None,
        );
        assert_eq!(facts[0].label, "Jane Doe");
        assert!(number_new_facts(facts, &known).is_empty());
    }

    #[test]
    fn test_derive_facts_without_modules_dir() {
        let commits = vec![commit(1, "Jane Doe", "j@x.org", "Init", &["m/fastqc/a.py"])];
        let facts = derive_facts(&commits, None);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].kind, RecordKind::ContributorSeen);
    }

    #[test]
    fn test_new_rejects_missing_path() {
        let result = GitLogSource::new("/tmp/does-not-exist-repo-stats-xyz", None);
        assert!(matches!(result, Err(StatsError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_new_rejects_file_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            GitLogSource::new(&file, None),
            Err(StatsError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_non_repository_is_source_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = GitLogSource::new(dir.path(), None).unwrap();
        assert!(matches!(
            source.records_since(0),
            Err(StatsError::SourceUnavailable { .. })
        ));
    }

    fn git(dir: &Path, args: &[&str], date: &str) -> bool {
        git_as(dir, "Jane Doe", args, date)
    }

    fn git_as(dir: &Path, name: &str, args: &[&str], date: &str) -> bool {
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        Command::new("git")
            .arg("-C")
            .arg(dir)
            .arg("-c")
            .arg(format!("user.name={name}"))
            .arg("-c")
            .arg(format!("user.email={email}"))
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_records_from_real_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"], "2024-01-01T00:00:00Z") {
            // git is not installed in this environment.
            return;
        }

        std::fs::create_dir_all(root.join("pkg/modules/fastqc")).unwrap();
        std::fs::write(root.join("pkg/modules/fastqc/__init__.py"), "").unwrap();
        assert!(git(root, &["add", "."], "2024-01-05T10:00:00Z"));
        assert!(git(
            root,
            &["commit", "-q", "-m", "Add fastqc\n\nCo-authored-by: Bob Jones <b@x.org>"],
            "2024-01-05T10:00:00Z"
        ));

        std::fs::write(root.join("README.md"), "docs").unwrap();
        assert!(git(root, &["add", "."], "2024-02-01T10:00:00Z"));
        assert!(git(root, &["commit", "-q", "-m", "Docs"], "2024-02-01T10:00:00Z"));

        let source = GitLogSource::new(root, Some("pkg/modules".to_string())).unwrap();
        let records: Vec<Record> = source
            .records_since(0)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["fastqc", "Jane Doe", "Bob Jones"]);
        assert_eq!(
            records[0].created_at,
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
        );
    }

    fn add_module(root: &Path, module: &str) {
        let dir = root.join("pkg/modules").join(module);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("__init__.py"), module).unwrap();
    }

    fn sorted_labels(snapshot: &CacheSnapshot, kind: RecordKind) -> Vec<String> {
        let mut labels: Vec<String> = snapshot
            .records_of_kind(kind)
            .into_iter()
            .map(|r| r.label)
            .collect();
        labels.sort();
        labels
    }

    #[test]
    fn test_resume_after_merging_older_branch() {
        use stats_data::cache::CacheStore;
        use stats_data::collector::IncrementalCollector;

        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        if !git(&root, &["init", "-q"], "2024-01-01T00:00:00Z") {
            // git is not installed in this environment.
            return;
        }

        add_module(&root, "a");
        assert!(git_as(&root, "Jane", &["add", "."], "2024-01-01T10:00:00Z"));
        assert!(git_as(&root, "Jane", &["commit", "-q", "-m", "Add a"], "2024-01-01T10:00:00Z"));

        assert!(git(&root, &["checkout", "-q", "-b", "feat"], "2024-01-02T10:00:00Z"));
        add_module(&root, "b");
        assert!(git_as(&root, "Bob", &["add", "."], "2024-01-02T10:00:00Z"));
        assert!(git_as(&root, "Bob", &["commit", "-q", "-m", "Add b"], "2024-01-02T10:00:00Z"));

        assert!(git(&root, &["checkout", "-q", "-"], "2024-01-03T10:00:00Z"));
        add_module(&root, "c");
        assert!(git_as(&root, "Carol", &["add", "."], "2024-01-03T10:00:00Z"));
        assert!(git_as(&root, "Carol", &["commit", "-q", "-m", "Add c"], "2024-01-03T10:00:00Z"));

        let collector =
            IncrementalCollector::new(CacheStore::new(dir.path().join("cache")), 100).unwrap();
        let source = GitLogSource::new(&root, Some("pkg/modules".to_string())).unwrap();

        let first = collector.collect(&source, "git/repo", true).unwrap();
        assert_eq!(sorted_labels(&first.snapshot, RecordKind::ModuleAdded), vec!["a", "c"]);
        assert_eq!(
            sorted_labels(&first.snapshot, RecordKind::ContributorSeen),
            vec!["Carol", "Jane"]
        );

        assert!(git_as(
            &root,
            "Jane",
            &["merge", "-q", "--no-ff", "--no-edit", "-m", "Merge feat", "feat"],
            "2024-01-04T10:00:00Z"
        ));

        let second = collector.collect(&source, "git/repo", true).unwrap();
        assert_eq!(second.new_records, 2);
        assert_eq!(
            sorted_labels(&second.snapshot, RecordKind::ModuleAdded),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            sorted_labels(&second.snapshot, RecordKind::ContributorSeen),
            vec!["Bob", "Carol", "Jane"]
        );
        assert_eq!(second.snapshot.checkpoint(), 6);

        let third = collector.collect(&source, "git/repo", true).unwrap();
        assert_eq!(third.new_records, 0);
        assert_eq!(third.snapshot.len(), 6);
    }
}
