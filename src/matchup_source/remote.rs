use std::{collections::VecDeque, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{resolve_all, MatchupSource};
use crate::bot::Side;
use crate::bot_registry::BotRegistry;
use crate::matchup::Matchup;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteBot {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteMatchup {
    bot1: RemoteBot,
    bot2: RemoteBot,
    map: String,
}

/// A list served over HTTP as JSON:
/// `[{"Bot1": {"Name", "Id", "Checksum"}, "Bot2": {...}, "Map": "..."}]`.
#[derive(Debug, Clone)]
pub struct RemoteMatchupSource {
    url: String,
    timeout: Duration,
}

impl RemoteMatchupSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl MatchupSource for RemoteMatchupSource {
    #[instrument(skip_all, fields(url = %self.url))]
    fn fetch(&self, bots: &BotRegistry) -> anyhow::Result<VecDeque<Matchup>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let body = client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("could not fetch matchups from {}", self.url))?;
        debug!("{} bytes received", body.len());
        parse_remote_matchups(&body, bots)
    }

    fn describe(&self) -> String {
        format!("remote matchups at {}", self.url)
    }
}

/// Parse a remote matchup list. Ids and checksums are kept on the matchup.
pub fn parse_remote_matchups(json: &str, bots: &BotRegistry) -> anyhow::Result<VecDeque<Matchup>> {
    let entries: Vec<RemoteMatchup> =
        serde_json::from_str(json).context("invalid remote matchup list")?;
    Ok(resolve_all(entries, |entry| {
        let mut matchup = Matchup::new(
            bots.enabled(&entry.bot1.name)?.clone(),
            bots.enabled(&entry.bot2.name)?.clone(),
            entry.map,
        );
        for (side, remote) in [(Side::Player1, entry.bot1), (Side::Player2, entry.bot2)] {
            if let Some(id) = remote.id {
                matchup = matchup.with_external_id(side, id);
            }
            if let Some(checksum) = remote.checksum.filter(|c| !c.is_empty()) {
                matchup = matchup.with_checksum(side, checksum);
            }
        }
        Ok(matchup)
    }))
}
