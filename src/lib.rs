//! # Ladder Manager
//!
//! Runs bot-vs-bot matches for a ladder: each matchup puts two bots on a map, the bots run as
//! separate OS processes (or in-process, or as the engine's own AI), and an external game
//! engine simulates the match.
//!
//! It provides:
//! - Launching bots of any runtime (native, Python, Wine, Mono, .NET, Java, Node.js, built-in)
//!   through a [`RuntimeAdapterRegistry`](crate::runtime_adapter::RuntimeAdapterRegistry)
//! - Process supervision with cgroups v2 containment on Linux, checksum verification and
//!   guaranteed cleanup ([`process_supervisor`])
//! - A match state machine polling the engine until the game ends, a side crashes, leaves or
//!   stays silent, or the game loop budget runs out ([`session`])
//! - A total mapping from the way a match ended to its result ([`classifier`])
//! - A scheduler draining a queue of matchups, serially or a few at a time, archiving replays
//!   and persisting every result ([`scheduler`])
//!
//! The ladder never simulates anything itself: the engine is reached through the
//! [`GameEngine`](crate::engine::GameEngine) and [`EngineFactory`](crate::engine::EngineFactory)
//! traits.
//!
//! # Documentation Overview
//!
//! - Bots and the bot file: [`bot`], [`bot_registry`]
//! - Matchups and where they come from: [`matchup`], [`matchup_source`]
//! - Behavior and limits: [`Configuration`](crate::configuration::Configuration),
//!   [`MatchLimitsBuilder`](crate::limits::MatchLimitsBuilder)
//! - Results: [`game_result`], [`result_store`], [`archive`]
//!
//! # Usage Example
//!
//! ```no_run
//! # struct YourEngine;
//! # impl ladder_manager::engine::GameEngine for YourEngine {
//! #     type Session = ();
//! #     fn launch_match(&mut self, _p: [Participant; 2], _map: &str, _replays: Option<&std::path::Path>) -> anyhow::Result<()> { Ok(()) }
//! #     fn advance(&mut self, _s: &mut ()) -> anyhow::Result<bool> { Ok(false) }
//! #     fn read_state(&self, _s: &()) -> ladder_manager::engine::GameState { Default::default() }
//! #     fn winner(&self, _s: &()) -> Option<Side> { None }
//! #     fn side_report(&self, _s: &(), _side: Side) -> ladder_manager::engine::SideReport {
//! #         Default::default()
//! #     }
//! # }
//! # struct YourEngineFactory;
//! # impl EngineFactory for YourEngineFactory {
//! #     type Engine = YourEngine;
//! #     fn new_engine(&self) -> anyhow::Result<YourEngine> { Ok(YourEngine) }
//! # }
//! use std::time::Duration;
//! use ladder_manager::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let limits = MatchLimitsBuilder::from_env()
//!         .with_client_timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     // LadderBots.json, matchuplist and results.jsonl in the current directory
//!     let config = Configuration::from_env().with_allow_uncontained(true);
//!
//!     let summary = run_ladder(config, limits, BuiltinRegistry::new(), &YourEngineFactory)?;
//!     println!(
//!         "{} matches played, {} failed",
//!         summary.processed, summary.failures
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Bot Requirements
//!
//! External bots are started in their root directory with their own arguments followed by
//! `--GamePort <port> --StartPort <port> --LadderServer <address>` and, when the opponent is
//! known to the submission system, `--OpponentId <id>`. Stdin and stdout are closed; stderr
//! too, unless [`Configuration::with_debug_bot_stderr`](crate::configuration::Configuration::with_debug_bot_stderr)
//! is set.

pub use anyhow;

pub mod archive;
pub mod bot;
pub mod bot_registry;
pub mod builtin;
pub mod classifier;
pub mod configuration;
pub mod engine;
pub mod game_result;
pub mod limits;
mod logger;
pub mod matchup;
pub mod matchup_source;
pub mod process_supervisor;
pub mod result_store;
pub mod runtime_adapter;
pub mod scheduler;
pub mod session;
pub mod stop;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use ladder_manager::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bot::{BotConfig, Difficulty, Race, RuntimeKind, Side};
    pub use crate::bot_registry::BotRegistry;
    pub use crate::builtin::{BuiltinAgent, BuiltinRegistry};
    pub use crate::classifier::{ResultType, SimultaneousFailure};
    pub use crate::configuration::Configuration;
    pub use crate::engine::{EngineFactory, GameEngine, Participant};
    pub use crate::game_result::GameResult;
    pub use crate::limits::MatchLimitsBuilder;
    pub use crate::matchup::Matchup;
    pub use crate::process_supervisor::OsSupervisor;
    pub use crate::scheduler::{run_ladder, RunSummary, Scheduler};
    pub use crate::session::ExitCase;
    pub use crate::stop::StopSignal;
}
