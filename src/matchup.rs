use std::fmt::Display;

use crate::bot::{BotConfig, Side};

/// Two bots and a map.
///
/// Optional per-side checksum and external identifier come from the submission system. A
/// declared checksum must be verified before the corresponding bot is started.
#[derive(Debug, Clone)]
pub struct Matchup {
    bots: [BotConfig; 2],
    ids: [Option<String>; 2],
    checksums: [Option<String>; 2],
    map: String,
}

impl Matchup {
    pub fn new(bot1: BotConfig, bot2: BotConfig, map: impl Into<String>) -> Matchup {
        Matchup {
            bots: [bot1, bot2],
            ids: [None, None],
            checksums: [None, None],
            map: map.into(),
        }
    }

    pub fn with_external_id(mut self, side: Side, id: impl Into<String>) -> Self {
        self.ids[side.index()] = Some(id.into());
        self
    }

    pub fn with_checksum(mut self, side: Side, checksum: impl Into<String>) -> Self {
        self.checksums[side.index()] = Some(checksum.into());
        self
    }

    pub fn bot(&self, side: Side) -> &BotConfig {
        &self.bots[side.index()]
    }

    pub fn external_id(&self, side: Side) -> Option<&str> {
        self.ids[side.index()].as_deref()
    }

    pub fn checksum(&self, side: Side) -> Option<&str> {
        self.checksums[side.index()].as_deref()
    }

    pub fn map(&self) -> &str {
        &self.map
    }
}

impl Display for Matchup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} VS {} on {}]",
            self.bots[0].name,
            self.bots[1].name,
            map_display_name(&self.map)
        )
    }
}

/// Map name without its file extension (`TestMapLE.SC2Map` -> `TestMapLE`).
pub fn map_display_name(map: &str) -> &str {
    match map.rfind('.') {
        Some(dot) => &map[..dot],
        None => map,
    }
}
