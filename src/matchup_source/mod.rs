//! Where matchups come from.
//!
//! Both sources produce the same ordered queue of [`Matchup`]s, with bot names resolved
//! against the [`BotRegistry`]. A matchup naming an unknown or disabled bot is skipped with a
//! warning instead of failing the whole list.

mod file;
mod remote;

use std::collections::VecDeque;

use tracing::{info, warn};

use crate::bot_registry::BotRegistry;
use crate::matchup::Matchup;

pub use file::{parse_matchup_line, FileMatchupSource};
pub use remote::{parse_remote_matchups, RemoteMatchupSource};

pub trait MatchupSource {
    fn fetch(&self, bots: &BotRegistry) -> anyhow::Result<VecDeque<Matchup>>;

    /// For logs.
    fn describe(&self) -> String;
}

/// Tries `primary` up to `attempts` times, then falls back to `fallback`.
pub struct FallbackSource {
    primary: Box<dyn MatchupSource + Send>,
    fallback: Box<dyn MatchupSource + Send>,
    attempts: usize,
}

impl FallbackSource {
    pub fn new(
        primary: impl MatchupSource + Send + 'static,
        fallback: impl MatchupSource + Send + 'static,
        attempts: usize,
    ) -> Self {
        Self {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
            attempts: attempts.max(1),
        }
    }
}

impl MatchupSource for FallbackSource {
    fn fetch(&self, bots: &BotRegistry) -> anyhow::Result<VecDeque<Matchup>> {
        for attempt in 1..=self.attempts {
            match self.primary.fetch(bots) {
                Ok(matchups) => return Ok(matchups),
                Err(e) => warn!(
                    "attempt {attempt}/{} on {} failed: {e:#}",
                    self.attempts,
                    self.primary.describe()
                ),
            }
        }
        info!("falling back to {}", self.fallback.describe());
        self.fallback.fetch(bots)
    }

    fn describe(&self) -> String {
        format!(
            "{} (fallback: {})",
            self.primary.describe(),
            self.fallback.describe()
        )
    }
}

/// Keep the resolvable entries of a list, in order.
fn resolve_all<T>(
    entries: impl IntoIterator<Item = T>,
    mut resolve: impl FnMut(T) -> anyhow::Result<Matchup>,
) -> VecDeque<Matchup> {
    entries
        .into_iter()
        .filter_map(|entry| match resolve(entry) {
            Ok(matchup) => Some(matchup),
            Err(e) => {
                warn!("skipping matchup: {e:#}");
                None
            }
        })
        .collect()
}
