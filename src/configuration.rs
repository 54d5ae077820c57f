//! Config for the ladder behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are enabled with `"true"` (case-insensitive).
//!
//! - `LADDER_VERBOSE`: print match progress (default: `true`)
//! - `LADDER_LOG`: log to a file (default: `false`)
//! - `LADDER_LOG_DIR`: where the log file is created (default: `.`)
//! - `LADDER_ALLOW_UNCONTAINED`: run bots without cgroup when containment is unavailable (default: `false`)
//! - `LADDER_DEBUG_BOT_STDERR`: let bots write to stderr (default: `false`)
//! - `LADDER_MAX_CONCURRENT_MATCHES`: matches running at once (default: `1`)
//! - `LADDER_BOTS_FILE`: bot list (default: `LadderBots.json`)
//! - `LADDER_MATCHUP_LIST`: local matchup list (default: `matchuplist`)
//! - `LADDER_MATCHUP_URL`: remote matchup list, the local list becomes a fallback
//! - `LADDER_MATCHUP_FETCH_RETRIES`: attempts on the remote list (default: `3`)
//! - `LADDER_RESULTS_FILE`: results, one JSON object per line (default: `results.jsonl`)
//! - `LADDER_REPLAY_DIR`: where the engine saves replays
//! - `LADDER_ARCHIVE_DIR`: where replays are archived, per match
//! - `LADDER_SERVER`: address given to bots to reach the engine (default: `127.0.0.1`)
//! - `LADDER_PYTHON`, `LADDER_WINE`, `LADDER_MONO`, `LADDER_DOTNET`, `LADDER_JAVA`,
//!   `LADDER_NODE`: host programs
//! - `LADDER_SIMULTANEOUS_FAILURE`: `tie` or `error`, result when both sides die (default: `tie`)

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::classifier::SimultaneousFailure;
use crate::runtime_adapter::RuntimePaths;

/// Configuration for ladder behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) log_dir: PathBuf,
    pub(crate) allow_uncontained: bool,
    pub(crate) debug_bot_stderr: bool,
    pub(crate) max_concurrent_matches: usize,
    pub(crate) bots_file: PathBuf,
    pub(crate) matchup_list_file: PathBuf,
    pub(crate) matchup_url: Option<String>,
    pub(crate) matchup_fetch_retries: usize,
    pub(crate) results_file: PathBuf,
    pub(crate) replay_dir: Option<PathBuf>,
    pub(crate) archive_dir: Option<PathBuf>,
    pub(crate) ladder_server: String,
    pub(crate) runtime_paths: RuntimePaths,
    pub(crate) simultaneous_failure: SimultaneousFailure,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Match progress is printed to stdout, nothing is logged to file.
    /// - Bots must be contained, and their stderr is discarded.
    /// - Matches run one at a time.
    /// - Replays are not archived.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            log_dir: PathBuf::from("."),
            allow_uncontained: false,
            debug_bot_stderr: false,
            max_concurrent_matches: 1,
            bots_file: PathBuf::from("LadderBots.json"),
            matchup_list_file: PathBuf::from("matchuplist"),
            matchup_url: None,
            matchup_fetch_retries: 3,
            results_file: PathBuf::from("results.jsonl"),
            replay_dir: None,
            archive_dir: None,
            ladder_server: "127.0.0.1".to_string(),
            runtime_paths: RuntimePaths::default(),
            simultaneous_failure: SimultaneousFailure::Tie,
        }
    }

    /// Create configuration from `LADDER_*` environment variables (see module documentation).
    ///
    /// Unset or unparsable values keep their default.
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        fn flag(name: &str, default: bool) -> bool {
            var(name).map_or(default, |v| v.eq_ignore_ascii_case("true"))
        }
        fn number(name: &str) -> Option<usize> {
            let value = var(name)?;
            match value.parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("ignoring {name}={value}: not a number");
                    None
                }
            }
        }

        let defaults = Self::new();
        let paths = defaults.runtime_paths.clone();
        let runtime_paths = RuntimePaths {
            python: var("LADDER_PYTHON").unwrap_or(paths.python),
            wine: var("LADDER_WINE").unwrap_or(paths.wine),
            mono: var("LADDER_MONO").unwrap_or(paths.mono),
            dotnet: var("LADDER_DOTNET").unwrap_or(paths.dotnet),
            java: var("LADDER_JAVA").unwrap_or(paths.java),
            node: var("LADDER_NODE").unwrap_or(paths.node),
        };
        let simultaneous_failure = match var("LADDER_SIMULTANEOUS_FAILURE") {
            Some(v) if v.eq_ignore_ascii_case("error") => SimultaneousFailure::Error,
            _ => SimultaneousFailure::Tie,
        };

        let config = Self {
            verbose: flag("LADDER_VERBOSE", defaults.verbose),
            log: flag("LADDER_LOG", defaults.log),
            log_dir: var("LADDER_LOG_DIR").map_or(defaults.log_dir, PathBuf::from),
            allow_uncontained: flag("LADDER_ALLOW_UNCONTAINED", defaults.allow_uncontained),
            debug_bot_stderr: flag("LADDER_DEBUG_BOT_STDERR", defaults.debug_bot_stderr),
            max_concurrent_matches: defaults.max_concurrent_matches,
            bots_file: var("LADDER_BOTS_FILE").map_or(defaults.bots_file, PathBuf::from),
            matchup_list_file: var("LADDER_MATCHUP_LIST")
                .map_or(defaults.matchup_list_file, PathBuf::from),
            matchup_url: var("LADDER_MATCHUP_URL"),
            matchup_fetch_retries: number("LADDER_MATCHUP_FETCH_RETRIES")
                .unwrap_or(defaults.matchup_fetch_retries),
            results_file: var("LADDER_RESULTS_FILE").map_or(defaults.results_file, PathBuf::from),
            replay_dir: var("LADDER_REPLAY_DIR").map(PathBuf::from),
            archive_dir: var("LADDER_ARCHIVE_DIR").map(PathBuf::from),
            ladder_server: var("LADDER_SERVER").unwrap_or(defaults.ladder_server),
            runtime_paths,
            simultaneous_failure,
        };
        match number("LADDER_MAX_CONCURRENT_MATCHES") {
            Some(n) => config.with_max_concurrent_matches(n),
            None => config,
        }
    }

    /// Enable or disable match progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Allow bots to run outside of a cgroup when one cannot be created.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable bot stderr output (debug purposes only).
    pub fn with_debug_bot_stderr(mut self, value: bool) -> Self {
        self.debug_bot_stderr = value;
        self
    }

    /// Matches running at once, at least 1 and at most the number of physical cores.
    pub fn with_max_concurrent_matches(mut self, count: usize) -> Self {
        let cores = num_cpus::get_physical().max(1);
        if count > cores {
            warn!("{count} concurrent matches requested, only {cores} physical cores available");
        }
        self.max_concurrent_matches = count.clamp(1, cores);
        self
    }

    pub fn with_bots_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bots_file = path.into();
        self
    }

    pub fn with_matchup_list_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.matchup_list_file = path.into();
        self
    }

    /// Fetch matchups from `url`, falling back to the local list.
    pub fn with_matchup_url(mut self, url: impl Into<String>) -> Self {
        self.matchup_url = Some(url.into());
        self
    }

    pub fn with_matchup_fetch_retries(mut self, retries: usize) -> Self {
        self.matchup_fetch_retries = retries;
        self
    }

    pub fn with_results_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_file = path.into();
        self
    }

    /// Archive the content of `replay_dir` into `archive_dir` after each match.
    pub fn with_replays(mut self, replay_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        self.replay_dir = Some(replay_dir.into());
        self.archive_dir = Some(archive_dir.into());
        self
    }

    pub fn with_ladder_server(mut self, address: impl Into<String>) -> Self {
        self.ladder_server = address.into();
        self
    }

    pub fn with_runtime_paths(mut self, paths: RuntimePaths) -> Self {
        self.runtime_paths = paths;
        self
    }

    pub fn with_simultaneous_failure(mut self, policy: SimultaneousFailure) -> Self {
        self.simultaneous_failure = policy;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn max_concurrent_matches(&self) -> usize {
        self.max_concurrent_matches
    }

    pub fn bots_file(&self) -> &Path {
        &self.bots_file
    }

    pub fn results_file(&self) -> &Path {
        &self.results_file
    }

    pub fn runtime_paths(&self) -> &RuntimePaths {
        &self.runtime_paths
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
