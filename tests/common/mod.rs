#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use ladder_manager::engine::{GameState, SideReport};
use ladder_manager::prelude::*;
use tracing::Level;

/// Route logs to the test output. Only the first call has an effect.
pub fn init_test_logger() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Write an executable shell script at `dir/name`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Native bot that keeps running until killed.
pub fn sleeping_bot(dir: &Path, name: &str) -> BotConfig {
    script(dir, name, "exec sleep 30");
    BotConfig::new(RuntimeKind::BinaryCpp, name, Race::Terran, dir, name)
}

/// Native bot that dies right away.
pub fn crashing_bot(dir: &Path, name: &str) -> BotConfig {
    script(dir, name, "exit 3");
    BotConfig::new(RuntimeKind::BinaryCpp, name, Race::Zerg, dir, name)
}

/// An engine playing a fixed number of steps, both sides acting on each of them.
pub struct ScriptedEngine {
    end_at: u32,
    winner: Option<Side>,
    step_delay: Duration,
    launches: Arc<AtomicUsize>,
}

impl GameEngine for ScriptedEngine {
    type Session = u32;

    /// Leaves a replay holding the map name behind.
    fn launch_match(
        &mut self,
        participants: [Participant; 2],
        map: &str,
        replay_dir: Option<&Path>,
    ) -> anyhow::Result<u32> {
        assert_eq!(participants.len(), 2);
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(dir) = replay_dir {
            fs::write(dir.join("match.SC2Replay"), map)?;
        }
        Ok(0)
    }

    fn advance(&mut self, game_loop: &mut u32) -> anyhow::Result<bool> {
        std::thread::sleep(self.step_delay);
        *game_loop += 1;
        Ok(*game_loop < self.end_at)
    }

    fn read_state(&self, game_loop: &u32) -> GameState {
        GameState {
            is_in_game: *game_loop < self.end_at,
            game_loop: *game_loop,
            score: 0.0,
        }
    }

    fn winner(&self, game_loop: &u32) -> Option<Side> {
        if *game_loop >= self.end_at {
            self.winner
        } else {
            None
        }
    }

    fn side_report(&self, game_loop: &u32, _side: Side) -> SideReport {
        SideReport {
            actions: *game_loop as u64,
            avg_frame_ms: 1.0,
            requested_exit: false,
        }
    }
}

#[derive(Clone)]
pub struct ScriptedFactory {
    pub end_at: u32,
    pub winner: Option<Side>,
    pub step_delay: Duration,
    pub launches: Arc<AtomicUsize>,
    pub unreachable: bool,
}

impl ScriptedFactory {
    pub fn new(end_at: u32, winner: Option<Side>) -> Self {
        Self {
            end_at,
            winner,
            step_delay: Duration::from_millis(1),
            launches: Arc::new(AtomicUsize::new(0)),
            unreachable: false,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(1, None)
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn new_engine(&self) -> anyhow::Result<ScriptedEngine> {
        if self.unreachable {
            anyhow::bail!("engine refused the connection");
        }
        Ok(ScriptedEngine {
            end_at: self.end_at,
            winner: self.winner,
            step_delay: self.step_delay,
            launches: self.launches.clone(),
        })
    }
}

pub fn limits() -> ladder_manager::limits::MatchLimits {
    MatchLimitsBuilder::new()
        .with_client_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(1))
        .with_ram_per_bot(100)
        .build()
        .unwrap()
}

pub fn supervisor() -> OsSupervisor {
    OsSupervisor::new(limits().process().clone(), true)
}
