//! Persisting match results, one JSON object per line.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bot::Side;
use crate::game_result::GameResult;
use crate::matchup::Matchup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub bot1: String,
    pub bot2: String,
    pub bot1_id: Option<String>,
    pub bot2_id: Option<String>,
    pub map: String,
    #[serde(flatten)]
    pub result: GameResult,
}

impl MatchRecord {
    pub fn new(match_id: impl Into<String>, matchup: &Matchup, result: GameResult) -> Self {
        Self {
            match_id: match_id.into(),
            bot1: matchup.bot(Side::Player1).name.clone(),
            bot2: matchup.bot(Side::Player2).name.clone(),
            bot1_id: matchup.external_id(Side::Player1).map(String::from),
            bot2_id: matchup.external_id(Side::Player2).map(String::from),
            map: matchup.map().to_string(),
            result,
        }
    }
}

/// Where results go. Only ever called from one thread at a time.
pub trait ResultSink {
    fn record(&mut self, record: &MatchRecord) -> anyhow::Result<()>;
}

impl ResultSink for Vec<MatchRecord> {
    fn record(&mut self, record: &MatchRecord) -> anyhow::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Appends to a file; earlier results are kept.
#[derive(Debug)]
pub struct JsonLinesResultStore {
    path: PathBuf,
    file: File,
}

impl JsonLinesResultStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("could not open results file {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(path: &Path) -> anyhow::Result<Vec<MatchRecord>> {
        let file = File::open(path)
            .with_context(|| format!("could not open results file {}", path.display()))?;
        BufReader::new(file)
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|(n, line)| {
                let line = line?;
                serde_json::from_str(&line).with_context(|| format!("bad record on line {}", n + 1))
            })
            .collect()
    }
}

impl ResultSink for JsonLinesResultStore {
    fn record(&mut self, record: &MatchRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("could not write to {}", self.path.display()))
    }
}
