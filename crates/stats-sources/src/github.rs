//! GitHub issues and pull requests as a [`RecordSource`].
//!
//! Lists `/repos/{owner}/{repo}/issues?state=all` sorted by creation time,
//! ascending, one page at a time. Issue numbers are assigned at creation, so
//! this order is id order except for transferred issues, which the collector
//! tolerates. The adapter never retries; a failed page ends the stream with a
//! [`StatsError::SourceUnavailable`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use stats_core::error::{Result, StatsError};
use stats_core::models::{Record, RecordKind};
use stats_core::time_utils::{format_timestamp, rfc3339, rfc3339_option};
use stats_data::collector::{RecordSource, RecordStream};
use tracing::{debug, info, warn};

/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Items per page; the API maximum.
pub const DEFAULT_PER_PAGE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── RepoName ──────────────────────────────────────────────────────────────────

/// `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoName {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(StatsError::Config(format!(
                "repository must be in 'owner/repo' form, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// Fields used from one item of the issues listing.
#[derive(Debug, Deserialize)]
struct IssueItem {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(with = "rfc3339")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_option")]
    closed_at: Option<DateTime<Utc>>,
    /// Present (with any content) only on pull requests.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<IssueItem> for Record {
    fn from(item: IssueItem) -> Self {
        let kind = if item.pull_request.is_some() {
            RecordKind::PullRequest
        } else {
            RecordKind::Issue
        };
        Record::new(item.number, kind, item.created_at)
            .with_closed_at(item.closed_at)
            .with_label(item.title)
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    full_name: String,
}

/// Parse one page of the issues listing into records.
pub fn parse_issue_page(body: &str) -> Result<Vec<Record>> {
    let items: Vec<IssueItem> = serde_json::from_str(body)?;
    Ok(items.into_iter().map(Record::from).collect())
}

/// Human-readable reason for a failed API response.
///
/// `remaining` and `reset` come from the `x-ratelimit-*` headers.
pub fn describe_failure(status: u16, remaining: Option<u64>, reset: Option<i64>, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    let rate_limited = status == 429 || (status == 403 && remaining == Some(0));
    if rate_limited {
        return match reset.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            Some(at) => format!("rate limit exceeded; resets at {}", format_timestamp(&at)),
            None => "rate limit exceeded".to_string(),
        };
    }

    match status {
        401 => "authentication failed; check the access token".to_string(),
        403 => format!("access forbidden: {message}"),
        404 => "repository not found or not visible with these credentials".to_string(),
        code => format!("HTTP {code}: {message}"),
    }
}

// ── GitHubSource ──────────────────────────────────────────────────────────────

/// Blocking client for one repository's issues and pull requests.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: Client,
    repo: RepoName,
    token: Option<String>,
    api_base: String,
}

impl GitHubSource {
    /// Build a source for `repo` (`owner/repo`). Without a token the much
    /// lower anonymous rate limit applies.
    pub fn new(repo: &str, token: Option<String>) -> Result<Self> {
        let repo: RepoName = repo.parse()?;
        let client = Client::builder()
            .user_agent(concat!("repo-stats/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StatsError::source_unavailable(repo.to_string(), e.to_string()))?;

        let token = token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            warn!("no GitHub token provided; anonymous rate limits apply");
        }

        Ok(Self {
            client,
            repo,
            token,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Confirm the repository is reachable and return its canonical name.
    pub fn check_access(&self) -> Result<String> {
        let url = format!("{}/repos/{}/{}", self.api_base, self.repo.owner, self.repo.name);
        let response = self.get(&url, &[])?;
        let info: RepoInfo = response.json().map_err(|e| self.unavailable(e.to_string()))?;
        info!(repo = %info.full_name, "connected to repository");
        Ok(info.full_name)
    }

    /// Fetch one page (1-based) of the issues listing.
    pub fn fetch_page(&self, page: u32) -> Result<Vec<Record>> {
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.api_base, self.repo.owner, self.repo.name
        );
        let page_param = page.to_string();
        let per_page_param = DEFAULT_PER_PAGE.to_string();
        let query = [
            ("state", "all"),
            ("sort", "created"),
            ("direction", "asc"),
            ("per_page", per_page_param.as_str()),
            ("page", page_param.as_str()),
        ];

        let body = self
            .get(&url, &query)?
            .text()
            .map_err(|e| self.unavailable(format!("reading issues page {page}: {e}")))?;
        let records = parse_issue_page(&body)
            .map_err(|e| self.unavailable(format!("malformed issues page {page}: {e}")))?;

        debug!(repo = %self.repo, page, items = records.len(), "fetched issues page");
        Ok(records)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| self.unavailable(e.to_string()))?;
        self.check_status(response)
    }

    /// Pass successful responses through, convert failures to
    /// [`StatsError::SourceUnavailable`].
    fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_num = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        let remaining = header_num("x-ratelimit-remaining").and_then(|v| u64::try_from(v).ok());
        let reset = header_num("x-ratelimit-reset");

        let body = response.text().unwrap_or_default();
        Err(self.unavailable(describe_failure(status.as_u16(), remaining, reset, &body)))
    }

    fn unavailable(&self, reason: impl Into<String>) -> StatsError {
        StatsError::source_unavailable(self.repo.to_string(), reason)
    }
}

impl RecordSource for GitHubSource {
    /// The listing cannot be filtered by number, so every page is walked and
    /// the collector discards what it already has.
    fn records_since(&self, checkpoint: u64) -> Result<RecordStream<'_>> {
        debug!(repo = %self.repo, checkpoint, "listing issues and pull requests");
        Ok(Box::new(IssuePages::new(self)))
    }
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// Numbered pages of a listing.
trait PageSource {
    /// Page `number` (1-based); an empty page past the end.
    fn page(&self, number: u32) -> Result<Vec<Record>>;

    /// Items on a full page. A shorter page is the last one.
    fn page_size(&self) -> usize;
}

impl PageSource for GitHubSource {
    fn page(&self, number: u32) -> Result<Vec<Record>> {
        self.fetch_page(number)
    }

    fn page_size(&self) -> usize {
        DEFAULT_PER_PAGE as usize
    }
}

/// Lazy page-by-page iterator. Stops after a short or empty page, and after
/// the first failed page.
struct IssuePages<'a> {
    source: &'a dyn PageSource,
    next_page: u32,
    buffer: VecDeque<Record>,
    done: bool,
}

impl<'a> IssuePages<'a> {
    fn new(source: &'a dyn PageSource) -> Self {
        Self {
            source,
            next_page: 1,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl Iterator for IssuePages<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }

            match self.source.page(self.next_page) {
                Ok(records) => {
                    if records.len() < self.source.page_size() {
                        self.done = true;
                    }
                    self.next_page += 1;
                    self.buffer.extend(records);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
