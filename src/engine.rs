//! Traits the external game engine must implement.
//!
//! The ladder never simulates anything itself: it hands both participants to a [`GameEngine`],
//! steps it, and reads back what it needs to decide when and how the match ended.

use std::path::Path;

use crate::bot::{Difficulty, Race, Side};
use crate::builtin::BuiltinAgent;

/// One seat of a match, as handed to the engine.
#[derive(Debug)]
pub enum Participant {
    /// A bot process. It connects to the engine on `port`.
    External {
        name: String,
        race: Race,
        port: u16,
        pid: Option<u32>,
    },
    /// An agent built in-process.
    InProcess {
        name: String,
        race: Race,
        agent: Box<dyn BuiltinAgent>,
    },
    /// The engine's own AI.
    Computer { race: Race, difficulty: Difficulty },
}

impl Participant {
    pub fn race(&self) -> Race {
        match self {
            Participant::External { race, .. }
            | Participant::InProcess { race, .. }
            | Participant::Computer { race, .. } => *race,
        }
    }
}

/// Snapshot polled from the engine. Superseded on each poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameState {
    pub is_in_game: bool,
    pub game_loop: u32,
    /// Opaque.
    pub score: f32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            is_in_game: true,
            game_loop: 0,
            score: -1.0,
        }
    }
}

/// What the engine observed from one side so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideReport {
    /// Monotonic count of steps/actions received from this side.
    pub actions: u64,
    /// Average time the side took to process one step, in milliseconds.
    pub avg_frame_ms: f32,
    /// The side asked to leave the game.
    pub requested_exit: bool,
}

/// The external simulation, one match at a time.
///
/// Errors from any method mean the engine itself is unreachable or broken: the current match
/// ends with an infrastructure error and is not retried.
pub trait GameEngine {
    type Session;

    /// Start a match on `map`. Its replays go to `replay_dir`, which belongs to this match only.
    fn launch_match(
        &mut self,
        participants: [Participant; 2],
        map: &str,
        replay_dir: Option<&Path>,
    ) -> anyhow::Result<Self::Session>;

    /// Step the simulation. `false` once the match is over.
    fn advance(&mut self, session: &mut Self::Session) -> anyhow::Result<bool>;

    fn read_state(&self, session: &Self::Session) -> GameState;

    /// Winner reported by the engine, if any.
    fn winner(&self, session: &Self::Session) -> Option<Side>;

    fn side_report(&self, session: &Self::Session, side: Side) -> SideReport;

    /// Release the session. Called exactly once per launched session.
    fn close(&mut self, _session: Self::Session) {}
}

/// Creates one engine per running match.
pub trait EngineFactory: Send + Sync {
    type Engine: GameEngine;

    fn new_engine(&self) -> anyhow::Result<Self::Engine>;
}
