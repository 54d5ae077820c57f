use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use tracing::{info, instrument};

use super::{resolve_all, MatchupSource};
use crate::bot_registry::BotRegistry;
use crate::matchup::Matchup;

/// A local list, one matchup per line: `"Bot1"vs"Bot2" MapName`.
///
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct FileMatchupSource {
    path: PathBuf,
}

impl FileMatchupSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatchupSource for FileMatchupSource {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn fetch(&self, bots: &BotRegistry) -> anyhow::Result<VecDeque<Matchup>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("could not read matchup list '{}'", self.path.display()))?;
        let lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            });
        let matchups = resolve_all(lines, |(n, line)| {
            let (bot1, bot2, map) =
                parse_matchup_line(line).with_context(|| format!("line {}", n + 1))?;
            Ok(Matchup::new(
                bots.enabled(&bot1)?.clone(),
                bots.enabled(&bot2)?.clone(),
                map,
            ))
        });
        info!("{} matchup(s) read", matchups.len());
        Ok(matchups)
    }

    fn describe(&self) -> String {
        format!("matchup list {}", self.path.display())
    }
}

/// Split `"Bot1"vs"Bot2" MapName` into its three parts.
pub fn parse_matchup_line(line: &str) -> anyhow::Result<(String, String, String)> {
    let parts = line.trim().split('"').collect::<Vec<_>>();
    // ["", bot1, "vs", bot2, " map"]
    if parts.len() != 5 || !parts[0].is_empty() || !parts[2].trim().eq_ignore_ascii_case("vs") {
        bail!("expected '\"Bot1\"vs\"Bot2\" MapName', got '{line}'");
    }
    let (bot1, bot2, map) = (parts[1].trim(), parts[3].trim(), parts[4].trim());
    if bot1.is_empty() || bot2.is_empty() {
        bail!("empty bot name in '{line}'");
    }
    if map.is_empty() {
        bail!("missing map in '{line}'");
    }
    Ok((bot1.to_string(), bot2.to_string(), map.to_string()))
}
