//! Time and resource limits applied to every match.
//!
//! [`MatchLimitsBuilder`] configures:
//!
//! - **Client response budget**: how long a side may stay silent before the match ends with a
//!   client timeout
//! - **Game loop budget**: maximum number of simulation steps before the match ends with a game
//!   timeout
//! - **Process limits**: RAM per bot and allowed cpus, enforced with cgroups v2 on Linux
//! - **Polling**: delay between two engine polls, and how long a kill may wait
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ladder_manager::limits::MatchLimitsBuilder;
//!
//! let limits = MatchLimitsBuilder::new()
//!     .with_client_timeout(Duration::from_secs(30))
//!     .with_max_game_loop(20_000)
//!     .with_ram_per_bot(100)
//!     .with_cpu_list("0-3")
//!     .build()
//!     .unwrap();
//! assert_eq!(limits.max_game_loop(), 20_000);
//! ```

use std::{env, time::Duration};

use anyhow::{bail, Context};
use tracing::warn;

use crate::process_supervisor::ProcessLimits;

/// About 45 minutes of game time at "faster" speed.
pub const DEFAULT_MAX_GAME_LOOP: u32 = 60_480;
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Builder for [`MatchLimits`]. Everything is optional.
#[derive(Debug, Default)]
pub struct MatchLimitsBuilder {
    client_timeout: Option<Duration>,
    max_game_loop: Option<u32>,
    poll_interval: Option<Duration>,
    kill_timeout: Option<Duration>,
    ram_per_bot: Option<usize>,
    cpu_list: Option<String>,
    concurrent_matches: Option<usize>,
}

impl MatchLimitsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from the environment:
    /// - `CLIENT_TIMEOUT_SECS` (u64)
    /// - `MAX_GAME_LOOP` (u32)
    /// - `POLL_INTERVAL_MS` (u64)
    /// - `KILL_TIMEOUT_MS` (u64)
    /// - `RAM_PER_BOT` (usize, MB)
    /// - `CPU_LIST` (string, e.g. "0-3,6")
    #[must_use]
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.parse().ok()
        }

        MatchLimitsBuilder {
            client_timeout: parse("CLIENT_TIMEOUT_SECS").map(Duration::from_secs),
            max_game_loop: parse("MAX_GAME_LOOP"),
            poll_interval: parse("POLL_INTERVAL_MS").map(Duration::from_millis),
            kill_timeout: parse("KILL_TIMEOUT_MS").map(Duration::from_millis),
            ram_per_bot: parse("RAM_PER_BOT"),
            cpu_list: env::var("CPU_LIST").ok(),
            concurrent_matches: None,
        }
    }

    /// Maximum silence of one side before it is considered unresponsive.
    #[must_use]
    pub fn with_client_timeout(self, timeout: Duration) -> Self {
        Self {
            client_timeout: Some(timeout),
            ..self
        }
    }

    /// Maximum number of simulation steps of a match.
    #[must_use]
    pub fn with_max_game_loop(self, max: u32) -> Self {
        Self {
            max_game_loop: Some(max),
            ..self
        }
    }

    #[must_use]
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        Self {
            poll_interval: Some(interval),
            ..self
        }
    }

    #[must_use]
    pub fn with_kill_timeout(self, timeout: Duration) -> Self {
        Self {
            kill_timeout: Some(timeout),
            ..self
        }
    }

    /// RAM available to each bot process (in MB).
    #[must_use]
    pub fn with_ram_per_bot(self, max: usize) -> Self {
        Self {
            ram_per_bot: Some(max),
            ..self
        }
    }

    /// Cpus the bots may run on: `"0-3,6,8"`.
    #[must_use]
    pub fn with_cpu_list(self, cpus: &str) -> Self {
        Self {
            cpu_list: Some(cpus.to_string()),
            ..self
        }
    }

    /// Number of matches expected to run at once. Only used to share the default RAM.
    #[must_use]
    pub fn with_concurrent_matches(self, count: usize) -> Self {
        Self {
            concurrent_matches: Some(count),
            ..self
        }
    }

    /// # Errors
    ///
    /// Zero budgets, a malformed cpu list, or more RAM per bot than the machine has.
    pub fn build(self) -> anyhow::Result<MatchLimits> {
        let client_timeout = self.client_timeout.unwrap_or(DEFAULT_CLIENT_TIMEOUT);
        if client_timeout.is_zero() {
            bail!("client timeout must be positive");
        }
        let max_game_loop = self.max_game_loop.unwrap_or(DEFAULT_MAX_GAME_LOOP);
        if max_game_loop == 0 {
            bail!("game loop budget must be positive");
        }

        let cpus = match self.cpu_list {
            Some(list) => {
                validate_cpu_list(&list).context("error parsing cpu list")?;
                list
            }
            None => String::new(),
        };

        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let available_mb = (sys.available_memory() / 1_000_000) as usize;
        let bots_at_once = self.concurrent_matches.unwrap_or(1).max(1) * 2;
        let ram_per_bot = match self.ram_per_bot {
            Some(ram) if available_mb > 0 && ram > available_mb => {
                bail!("RAM per bot ({ram}MB) is greater than available RAM ({available_mb}MB)")
            }
            Some(ram) => Some(ram),
            None if available_mb == 0 => {
                warn!("could not read available memory, bots will not be memory limited");
                None
            }
            None => Some(available_mb / bots_at_once),
        };

        Ok(MatchLimits {
            client_timeout,
            max_game_loop,
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            kill_timeout: self.kill_timeout.unwrap_or(Duration::from_secs(1)),
            process: ProcessLimits { ram_per_bot, cpus },
        })
    }
}

fn validate_cpu_list(s: &str) -> anyhow::Result<()> {
    if s.is_empty() {
        bail!("Empty string");
    }
    for item in s.split(',') {
        let bounds = item.split('-').collect::<Vec<_>>();
        if bounds.len() > 2 {
            bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            );
        }
        for bound in bounds {
            bound
                .trim()
                .parse::<u16>()
                .with_context(|| format!("could not parse {bound}"))?;
        }
    }
    Ok(())
}

/// Obtained using [`MatchLimitsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchLimits {
    pub(crate) client_timeout: Duration,
    pub(crate) max_game_loop: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) kill_timeout: Duration,
    pub(crate) process: ProcessLimits,
}

impl MatchLimits {
    pub fn builder() -> MatchLimitsBuilder {
        MatchLimitsBuilder::new()
    }

    pub fn client_timeout(&self) -> Duration {
        self.client_timeout
    }

    pub fn max_game_loop(&self) -> u32 {
        self.max_game_loop
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    pub fn process(&self) -> &ProcessLimits {
        &self.process
    }
}
