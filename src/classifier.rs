//! Mapping the way a match ended to its result.
//!
//! Rules, first match wins:
//! 1. a bot that could not be launched: `InitializationError`
//! 2. unless a side asked to leave, a dead side crashed and its opponent survives it; both sides
//!    dead is decided by [`SimultaneousFailure`]
//! 3. timeouts: the opponent of the blamed side wins, `Timeout` when nobody can be blamed
//! 4. normal end: the engine's winner, `Tie` without one
//! 5. a side leaving forfeits, unless the engine reports a winner
//! 6. anything else: `Error`

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bot::Side;
use crate::session::ExitCase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultType {
    InitializationError,
    Timeout,
    Player1Win,
    Player1Crash,
    Player2Win,
    Player2Crash,
    Tie,
    Error,
}

impl ResultType {
    pub fn win_for(side: Side) -> ResultType {
        match side {
            Side::Player1 => ResultType::Player1Win,
            Side::Player2 => ResultType::Player2Win,
        }
    }

    pub fn crash_of(side: Side) -> ResultType {
        match side {
            Side::Player1 => ResultType::Player1Crash,
            Side::Player2 => ResultType::Player2Crash,
        }
    }

    /// The match never produced a game outcome.
    pub fn is_failure(&self) -> bool {
        matches!(self, ResultType::InitializationError | ResultType::Error)
    }
}

impl Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What to call a match where both sides died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimultaneousFailure {
    #[default]
    Tie,
    Error,
}

/// Everything the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Both sides were started and handed to the engine.
    pub launched: bool,
    pub exit_case: ExitCase,
    /// Liveness of each side when the match stopped.
    pub alive: [bool; 2],
    pub engine_winner: Option<Side>,
    /// The side to blame for a timeout, or the side that asked to leave.
    pub attributed: Option<Side>,
}

pub fn classify(termination: &Termination, policy: SimultaneousFailure) -> ResultType {
    if !termination.launched {
        return ResultType::InitializationError;
    }

    if termination.exit_case != ExitCase::ClientRequestExit {
        match termination.alive {
            [false, true] => return ResultType::crash_of(Side::Player1),
            [true, false] => return ResultType::crash_of(Side::Player2),
            [false, false] => {
                return match policy {
                    SimultaneousFailure::Tie => ResultType::Tie,
                    SimultaneousFailure::Error => ResultType::Error,
                }
            }
            [true, true] => {}
        }
    }

    match termination.exit_case {
        ExitCase::ClientTimeout | ExitCase::GameTimeout => match termination.attributed {
            Some(blamed) => ResultType::win_for(blamed.opponent()),
            None => ResultType::Timeout,
        },
        ExitCase::GameEnd => match termination.engine_winner {
            Some(winner) => ResultType::win_for(winner),
            None => ResultType::Tie,
        },
        ExitCase::ClientRequestExit => {
            match (termination.engine_winner, termination.attributed) {
                (Some(winner), _) => ResultType::win_for(winner),
                (None, Some(leaver)) => ResultType::win_for(leaver.opponent()),
                (None, None) => ResultType::Error,
            }
        }
        ExitCase::InProgress => ResultType::Error,
    }
}
