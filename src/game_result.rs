use serde::{Deserialize, Serialize};
use time::{format_description, OffsetDateTime};

use crate::bot::Side;
use crate::classifier::ResultType;
use crate::session::ExitCase;

/// Final record of one match. Built once, when the match ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub result: ResultType,
    /// Average step processing time of each side, in milliseconds.
    pub bot1_avg_frame: f32,
    pub bot2_avg_frame: f32,
    pub game_loop: u32,
    pub timestamp: String,
    /// `None` when the match never started.
    pub exit_case: Option<ExitCase>,
    /// Side that could not be launched, crashed, timed out or left.
    pub attributed: Option<Side>,
    /// Human readable reason for failures.
    pub detail: Option<String>,
}

impl GameResult {
    pub fn new(result: ResultType, game_loop: u32) -> GameResult {
        GameResult {
            result,
            bot1_avg_frame: 0.0,
            bot2_avg_frame: 0.0,
            game_loop,
            timestamp: now_timestamp(),
            exit_case: None,
            attributed: None,
            detail: None,
        }
    }

    /// A match lost before it began.
    pub fn initialization_error(side: Option<Side>, detail: impl Into<String>) -> GameResult {
        GameResult {
            attributed: side,
            detail: Some(detail.into()),
            ..GameResult::new(ResultType::InitializationError, 0)
        }
    }

    /// A match the infrastructure could not carry out.
    pub fn infrastructure_error(game_loop: u32, detail: impl Into<String>) -> GameResult {
        GameResult {
            detail: Some(detail.into()),
            ..GameResult::new(ResultType::Error, game_loop)
        }
    }

    pub fn avg_frame(&self, side: Side) -> f32 {
        match side {
            Side::Player1 => self.bot1_avg_frame,
            Side::Player2 => self.bot2_avg_frame,
        }
    }
}

/// Local time as `DD-MM-YYYY HH-MM-SS`.
pub fn now_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_description::parse("[day]-[month]-[year] [hour]-[minute]-[second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_shape() {
        let ts = now_timestamp();
        // DD-MM-YYYY HH-MM-SS
        assert_eq!(ts.len(), 19, "{ts}");
        assert_eq!(&ts[2..3], "-");
        assert_eq!(&ts[10..11], " ");
    }

    #[test]
    fn serializes_to_json() {
        let result = GameResult {
            exit_case: Some(ExitCase::GameEnd),
            ..GameResult::new(ResultType::Player1Win, 42)
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"], "Player1Win");
        assert_eq!(json["game_loop"], 42);
        assert_eq!(json["exit_case"], "GameEnd");
    }
}
