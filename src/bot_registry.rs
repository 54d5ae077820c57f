//! Loading the ladder's bot list.
//!
//! The bot file is a JSON document keyed by bot name:
//!
//! ```json
//! {
//!   "Bots": {
//!     "Rocky": {
//!       "Race": "Zerg",
//!       "Type": "Python",
//!       "RootPath": "/bots/rocky",
//!       "FileName": "run.py",
//!       "Args": "--realtime",
//!       "Enabled": true
//!     }
//!   }
//! }
//! ```
//!
//! Every field but `Type` is optional. Unknown types are native binaries, unknown races are
//! `Random`, unknown difficulties are `Easy`.

use std::{collections::HashMap, path::Path};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::bot::{BotConfig, Difficulty, Race, RuntimeKind};

#[derive(Deserialize)]
struct BotsFile {
    #[serde(rename = "Bots")]
    bots: HashMap<String, BotEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BotEntry {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    race: String,
    #[serde(default)]
    root_path: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    args: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    player_id: String,
    #[serde(default)]
    debug: bool,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    skeleton: bool,
    #[serde(default, rename = "ELO")]
    elo: i32,
}

fn enabled_by_default() -> bool {
    true
}

/// All bots known to the ladder, by name.
#[derive(Debug, Default, Clone)]
pub struct BotRegistry {
    bots: HashMap<String, BotConfig>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a bot file.
    #[instrument]
    pub fn load(path: &Path) -> anyhow::Result<BotRegistry> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read bot file '{}'", path.display()))?;
        let registry = Self::parse(&json)?;
        info!(bots = registry.bots.len(), "bot file loaded");
        Ok(registry)
    }

    pub fn parse(json: &str) -> anyhow::Result<BotRegistry> {
        let file: BotsFile = serde_json::from_str(json).context("invalid bot file")?;
        let mut registry = BotRegistry::new();
        for (name, entry) in file.bots {
            if name.trim().is_empty() {
                bail!("bot with an empty name");
            }
            // parsing below never fails
            let race = entry.race.parse().unwrap_or(Race::Random);
            let difficulty = entry.difficulty.parse().unwrap_or(Difficulty::Easy);
            let kind = RuntimeKind::parse_name(&entry.kind).unwrap_or_else(|| {
                warn!(bot = %name, "unknown type '{}', launching it as BinaryCpp", entry.kind);
                RuntimeKind::BinaryCpp
            });
            let bot = BotConfig {
                kind,
                name: name.clone(),
                root_path: entry.root_path.into(),
                file_name: entry.file_name,
                race,
                difficulty,
                args: entry.args,
                player_id: entry.player_id,
                debug: entry.debug,
                enabled: entry.enabled,
                skeleton: entry.skeleton,
                elo: entry.elo,
            };
            registry.insert(bot);
        }
        Ok(registry)
    }

    /// Insert or replace (same name) a bot.
    pub fn insert(&mut self, bot: BotConfig) {
        if self.bots.insert(bot.name.clone(), bot).is_some() {
            warn!("bot registered twice, keeping the last one");
        }
    }

    pub fn get(&self, name: &str) -> Option<&BotConfig> {
        self.bots.get(name)
    }

    /// Enabled bot by name, with the reason as error otherwise.
    pub fn enabled(&self, name: &str) -> anyhow::Result<&BotConfig> {
        match self.bots.get(name) {
            Some(bot) if bot.enabled => Ok(bot),
            Some(_) => bail!("bot '{name}' is disabled"),
            None => bail!("unknown bot '{name}'"),
        }
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
