//! Turning a bot's [`RuntimeKind`] into an OS command.
//!
//! Each kind maps to exactly one [`LaunchRecipe`]:
//!
//! | kind                         | recipe                                   |
//! |------------------------------|------------------------------------------|
//! | `BinaryCpp`, `CommandCenter` | run the entry file directly              |
//! | `Python`                     | `python <entry>`                         |
//! | `Wine`                       | `wine <entry>`                           |
//! | `Mono`                       | `mono <entry>`                           |
//! | `DotNetCore`                 | `dotnet <entry>`                         |
//! | `Java`                       | `java -jar <entry>`                      |
//! | `NodeJS`                     | `node <entry>`                           |
//! | `Computer`, `Builtin`        | no process                               |
//!
//! The bot's own arguments and the ladder arguments follow the entry file. The working directory
//! is always the bot's root path.

use std::{
    collections::HashMap,
    fmt::Display,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::bot::{BotConfig, RuntimeKind};

/// Configuration problems. Fatal to one match, never to the ladder.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no launch recipe registered for runtime '{0}'")]
    UnregisteredRuntime(RuntimeKind),
    #[error("unknown built-in bot '{0}'")]
    UnknownBuiltin(String),
    #[error("built-in bot '{name}' does not provide its {capability}")]
    MissingCapability { name: String, capability: Capability },
}

/// What a built-in bot must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Factory,
    DisplayName,
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Factory => write!(f, "agent factory"),
            Capability::DisplayName => write!(f, "display name"),
        }
    }
}

/// Where the hosts and interpreters live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePaths {
    pub python: String,
    pub wine: String,
    pub mono: String,
    pub dotnet: String,
    pub java: String,
    pub node: String,
}

impl Default for RuntimePaths {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            wine: "wine".to_string(),
            mono: "mono".to_string(),
            dotnet: "dotnet".to_string(),
            java: "java".to_string(),
            node: "node".to_string(),
        }
    }
}

/// A fully resolved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Arguments the ladder gives every external bot so it can reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderArgs {
    pub game_port: u16,
    pub start_port: u16,
    pub server: String,
    pub opponent_id: Option<String>,
}

impl LadderArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--GamePort".to_string(),
            self.game_port.to_string(),
            "--StartPort".to_string(),
            self.start_port.to_string(),
            "--LadderServer".to_string(),
            self.server.clone(),
        ];
        if let Some(id) = &self.opponent_id {
            args.push("--OpponentId".to_string());
            args.push(id.clone());
        }
        args
    }
}

/// Template turning a [`BotConfig`] into a [`CommandLine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRecipe {
    /// The entry file is the executable.
    Direct,
    /// The entry file is handed to a host program.
    Hosted { host: String, host_args: Vec<String> },
    /// The bot lives in-process; nothing is started.
    InProcess,
}

impl LaunchRecipe {
    fn hosted(host: &str) -> LaunchRecipe {
        LaunchRecipe::Hosted {
            host: host.to_string(),
            host_args: vec![],
        }
    }

    /// `None` for [`LaunchRecipe::InProcess`].
    pub fn command_for(&self, bot: &BotConfig, ladder: &LadderArgs) -> Option<CommandLine> {
        let mut args = vec![];
        let program = match self {
            LaunchRecipe::InProcess => return None,
            LaunchRecipe::Direct => bot.entry_path(),
            LaunchRecipe::Hosted { host, host_args } => {
                args.extend(host_args.iter().cloned());
                args.push(bot.entry_path().to_string_lossy().into_owned());
                PathBuf::from(host)
            }
        };
        args.extend(bot.extra_args());
        args.extend(ladder.to_args());
        Some(CommandLine {
            program,
            args,
            working_dir: bot.root_path.clone(),
        })
    }
}

/// Recipe per runtime kind.
#[derive(Debug, Clone, Default)]
pub struct RuntimeAdapterRegistry {
    recipes: HashMap<RuntimeKind, LaunchRecipe>,
}

impl RuntimeAdapterRegistry {
    /// An empty registry. Every kind must be registered before use.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard recipes for every known kind.
    pub fn with_defaults(paths: &RuntimePaths) -> Self {
        let mut registry = Self::empty();
        for kind in RuntimeKind::ALL {
            let recipe = match kind {
                RuntimeKind::BinaryCpp | RuntimeKind::CommandCenter => LaunchRecipe::Direct,
                RuntimeKind::Python => LaunchRecipe::hosted(&paths.python),
                RuntimeKind::Wine => LaunchRecipe::hosted(&paths.wine),
                RuntimeKind::Mono => LaunchRecipe::hosted(&paths.mono),
                RuntimeKind::DotNetCore => LaunchRecipe::hosted(&paths.dotnet),
                RuntimeKind::Java => LaunchRecipe::Hosted {
                    host: paths.java.clone(),
                    host_args: vec!["-jar".to_string()],
                },
                RuntimeKind::NodeJS => LaunchRecipe::hosted(&paths.node),
                RuntimeKind::Computer | RuntimeKind::Builtin => LaunchRecipe::InProcess,
            };
            registry.register(kind, recipe);
        }
        registry
    }

    /// Set the recipe of `kind`, replacing any previous one.
    pub fn register(&mut self, kind: RuntimeKind, recipe: LaunchRecipe) {
        self.recipes.insert(kind, recipe);
    }

    pub fn resolve(&self, kind: RuntimeKind) -> Result<&LaunchRecipe, ConfigError> {
        self.recipes
            .get(&kind)
            .ok_or(ConfigError::UnregisteredRuntime(kind))
    }
}
