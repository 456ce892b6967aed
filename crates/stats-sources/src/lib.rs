//! Record sources for repo-stats.
//!
//! * [`github::GitHubSource`]: issues and pull requests from the GitHub REST
//!   API, paged lazily;
//! * [`git_log::GitLogSource`]: module and contributor first-seen facts mined
//!   from a local `git log`.

pub mod coauthors;
pub mod git_log;
pub mod github;

pub use git_log::GitLogSource;
pub use github::{GitHubSource, RepoName};
