use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default number of newly collected records between cache saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Cumulative, open and monthly statistics for repository issues, pull
/// requests, modules and contributors
#[derive(Parser, Debug, Clone)]
#[command(
    name = "repo-stats",
    about = "Cumulative, open and monthly statistics for repository activity",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding per-source cache files
    #[arg(long, global = true, env = "REPO_STATS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Ignore any existing cache and do not write one
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Newly collected records between cache saves
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CHECKPOINT_INTERVAL as u64,
        value_parser = clap::value_parser!(u64).range(1..=100_000)
    )]
    pub checkpoint_interval: u64,

    /// Directory the CSV files are written to
    #[arg(long, global = true, default_value = ".")]
    pub output_dir: PathBuf,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Which event source to collect from.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Issues and pull requests of a GitHub repository
    Github {
        /// Repository in `owner/repo` form
        repo: String,

        /// Personal access token for higher rate limits
        #[arg(long, short = 't', env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Modules and contributors mined from a local git checkout
    Git {
        /// Path to the repository working tree
        path: PathBuf,

        /// Directory whose immediate children count as modules
        /// (for example `multiqc/modules`)
        #[arg(long)]
        modules_dir: Option<String>,
    },
}

impl Settings {
    /// Parse the process arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::resolve(Self::parse())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Self::parse_from(args))
    }

    /// Checkpoint interval as a collection batch size.
    pub fn checkpoint_interval(&self) -> usize {
        usize::try_from(self.checkpoint_interval).unwrap_or(DEFAULT_CHECKPOINT_INTERVAL)
    }

    /// Identifier the cache file is keyed by.
    ///
    /// Git fact ids depend on the modules directory, so it is part of the key.
    pub fn source_id(&self) -> String {
        match &self.command {
            Command::Github { repo, .. } => repo.clone(),
            Command::Git { path, modules_dir } => {
                let name = path
                    .canonicalize()
                    .ok()
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                    .unwrap_or_else(|| path.to_string_lossy().to_string());
                match modules_dir {
                    Some(dir) => format!("git/{name}/{}", dir.trim_matches('/')),
                    None => format!("git/{name}"),
                }
            }
        }
    }

    fn resolve(mut settings: Settings) -> Settings {
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::load_from(["repo-stats", "github", "octo/widgets"]);

        assert_eq!(
            settings.command,
            Command::Github {
                repo: "octo/widgets".to_string(),
                token: std::env::var("GITHUB_TOKEN").ok(),
            }
        );
        assert!(!settings.no_cache);
        assert_eq!(settings.checkpoint_interval(), 100);
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_github_token_flag() {
        let settings = Settings::load_from(["repo-stats", "github", "octo/widgets", "-t", "abc"]);
        match settings.command {
            Command::Github { token, .. } => assert_eq!(token.as_deref(), Some("abc")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_settings_git_subcommand() {
        let settings = Settings::load_from([
            "repo-stats",
            "git",
            "/tmp/checkout",
            "--modules-dir",
            "multiqc/modules",
        ]);
        assert_eq!(
            settings.command,
            Command::Git {
                path: PathBuf::from("/tmp/checkout"),
                modules_dir: Some("multiqc/modules".to_string()),
            }
        );
    }

    #[test]
    fn test_settings_global_flags_after_subcommand() {
        let settings = Settings::load_from([
            "repo-stats",
            "github",
            "octo/widgets",
            "--no-cache",
            "--checkpoint-interval",
            "25",
            "--output-dir",
            "out",
        ]);
        assert!(settings.no_cache);
        assert_eq!(settings.checkpoint_interval(), 25);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_settings_rejects_zero_interval() {
        let result = Settings::try_parse_from([
            "repo-stats",
            "--checkpoint-interval",
            "0",
            "github",
            "octo/widgets",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_debug_overrides_log_level() {
        let settings = Settings::load_from(["repo-stats", "--debug", "github", "octo/widgets"]);
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_source_id_for_github() {
        let settings = Settings::load_from(["repo-stats", "github", "octo/widgets"]);
        assert_eq!(settings.source_id(), "octo/widgets");
    }

    #[test]
    fn test_source_id_for_git_uses_directory_name() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let checkout = tmp.path().join("widgets");
        std::fs::create_dir_all(&checkout).expect("create checkout");
        let settings = Settings::load_from([
            "repo-stats".into(),
            "git".into(),
            checkout.into_os_string(),
        ]);
        assert_eq!(settings.source_id(), "git/widgets");
    }

    #[test]
    fn test_source_id_for_git_includes_modules_dir() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let checkout = tmp.path().join("widgets");
        std::fs::create_dir_all(&checkout).expect("create checkout");
        let settings = Settings::load_from([
            "repo-stats".into(),
            "git".into(),
            checkout.into_os_string(),
            "--modules-dir".into(),
            "pkg/modules/".into(),
        ]);
        assert_eq!(settings.source_id(), "git/widgets/pkg/modules");
    }
}
