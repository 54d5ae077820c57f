//! Bot identity and launch recipe inputs.
//!
//! A [`BotConfig`] describes one bot: how it must be started ([`RuntimeKind`]), where its files
//! live, and the few game parameters forwarded to the engine. Two configs are the same bot iff
//! their names are equal.

use std::{
    fmt::Display,
    hash::Hash,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Execution environment a bot requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeKind {
    /// Native executable, started directly.
    BinaryCpp,
    /// Native executable built on the CommandCenter framework, started directly.
    CommandCenter,
    /// Python script, started through the interpreter.
    Python,
    /// Windows executable, started through the wine compatibility layer.
    Wine,
    /// .NET assembly hosted by mono.
    Mono,
    /// .NET assembly hosted by `dotnet`.
    DotNetCore,
    /// Jar file hosted by the JVM.
    Java,
    /// Javascript entry file hosted by node.
    NodeJS,
    /// The engine's own built-in AI. No process.
    Computer,
    /// Agent constructed in-process from the builtin registry. No process.
    Builtin,
}

impl RuntimeKind {
    /// All known kinds, in declaration order.
    pub const ALL: [RuntimeKind; 10] = [
        RuntimeKind::BinaryCpp,
        RuntimeKind::CommandCenter,
        RuntimeKind::Python,
        RuntimeKind::Wine,
        RuntimeKind::Mono,
        RuntimeKind::DotNetCore,
        RuntimeKind::Java,
        RuntimeKind::NodeJS,
        RuntimeKind::Computer,
        RuntimeKind::Builtin,
    ];

    /// Parse a registry type string, case-insensitive.
    ///
    /// Unknown strings fall back to [`RuntimeKind::BinaryCpp`], as ladder files in the wild rely
    /// on it.
    pub fn from_name(name: &str) -> RuntimeKind {
        RuntimeKind::parse_name(name).unwrap_or(RuntimeKind::BinaryCpp)
    }

    /// Case-insensitive, `None` for an unknown type.
    pub fn parse_name(name: &str) -> Option<RuntimeKind> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "binarycpp" => RuntimeKind::BinaryCpp,
            "commandcenter" => RuntimeKind::CommandCenter,
            "computer" => RuntimeKind::Computer,
            "python" => RuntimeKind::Python,
            "wine" => RuntimeKind::Wine,
            "mono" => RuntimeKind::Mono,
            "dotnetcore" => RuntimeKind::DotNetCore,
            "java" => RuntimeKind::Java,
            "nodejs" => RuntimeKind::NodeJS,
            "builtin" => RuntimeKind::Builtin,
            _ => return None,
        };
        Some(kind)
    }

    /// True when bots of this kind never get an OS process.
    pub fn is_in_process(&self) -> bool {
        matches!(self, RuntimeKind::Computer | RuntimeKind::Builtin)
    }
}

impl Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Race requested by a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Race {
    Terran,
    Protoss,
    Zerg,
    #[default]
    Random,
}

impl FromStr for Race {
    type Err = std::convert::Infallible;

    /// Never fails: unknown races are `Random`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "terran" => Race::Terran,
            "protoss" => Race::Protoss,
            "zerg" => Race::Zerg,
            _ => Race::Random,
        })
    }
}

impl Display for Race {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Difficulty of the engine's built-in AI. Ignored for every other kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    VeryEasy,
    #[default]
    Easy,
    Medium,
    MediumHard,
    Hard,
    HardVeryHard,
    VeryHard,
    CheatVision,
    CheatMoney,
    CheatInsane,
}

impl FromStr for Difficulty {
    type Err = std::convert::Infallible;

    /// Case-sensitive, unknown values are `Easy`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "VeryEasy" => Difficulty::VeryEasy,
            "Medium" => Difficulty::Medium,
            "MediumHard" => Difficulty::MediumHard,
            "Hard" => Difficulty::Hard,
            "HardVeryHard" => Difficulty::HardVeryHard,
            "VeryHard" => Difficulty::VeryHard,
            "CheatVision" => Difficulty::CheatVision,
            "CheatMoney" => Difficulty::CheatMoney,
            "CheatInsane" => Difficulty::CheatInsane,
            _ => Difficulty::Easy,
        })
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One of the two seats of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player1,
    Player2,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Player1, Side::Player2];

    pub fn index(self) -> usize {
        match self {
            Side::Player1 => 0,
            Side::Player2 => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Player1 => write!(f, "player 1"),
            Side::Player2 => write!(f, "player 2"),
        }
    }
}

/// Identity and launch recipe of one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub kind: RuntimeKind,
    pub name: String,
    pub root_path: PathBuf,
    pub file_name: String,
    pub race: Race,
    pub difficulty: Difficulty,
    /// Free-form extra arguments, whitespace separated.
    pub args: String,
    pub player_id: String,
    pub debug: bool,
    pub enabled: bool,
    /// The bot has no decision logic; it only exercises the orchestration.
    pub skeleton: bool,
    /// Opaque rating, passed through untouched.
    pub elo: i32,
}

impl PartialEq for BotConfig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for BotConfig {}

impl Hash for BotConfig {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl BotConfig {
    pub fn new(
        kind: RuntimeKind,
        name: impl Into<String>,
        race: Race,
        root_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> BotConfig {
        BotConfig {
            kind,
            name: name.into(),
            root_path: root_path.into(),
            file_name: file_name.into(),
            race,
            difficulty: Difficulty::default(),
            args: String::new(),
            player_id: String::new(),
            debug: false,
            enabled: true,
            skeleton: false,
            elo: 0,
        }
    }

    /// The engine's built-in AI at the given difficulty.
    pub fn computer(name: impl Into<String>, race: Race, difficulty: Difficulty) -> BotConfig {
        BotConfig {
            difficulty,
            ..BotConfig::new(RuntimeKind::Computer, name, race, "", "")
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_skeleton(mut self, value: bool) -> Self {
        self.skeleton = value;
        self
    }

    /// Path of the entry file (binary, script, assembly...).
    pub fn entry_path(&self) -> PathBuf {
        self.root_path.join(&self.file_name)
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Extra arguments split on whitespace.
    pub fn extra_args(&self) -> Vec<String> {
        self.args.split_whitespace().map(String::from).collect()
    }
}
