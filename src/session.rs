//! Driving one match from launch to verdict.
//!
//! [`SessionDriver::run`] starts both sides, hands them to the engine and polls it until one of
//! the terminal [`ExitCase`]s is reached:
//!
//! - `GameEnd`: the engine says the match is over
//! - `ClientRequestExit`: a side asked to leave
//! - `ClientTimeout`: a side stayed silent longer than the client budget, or its process died
//! - `GameTimeout`: the game loop went past its budget, whatever the sides are doing
//!
//! Both processes are killed before `run` returns, on every path.

use std::{
    fmt::Display,
    net::TcpListener,
    path::PathBuf,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::bot::{RuntimeKind, Side};
use crate::builtin::BuiltinRegistry;
use crate::classifier::{classify, SimultaneousFailure, Termination};
use crate::engine::{GameEngine, GameState, Participant, SideReport};
use crate::game_result::GameResult;
use crate::limits::MatchLimits;
use crate::matchup::Matchup;
use crate::process_supervisor::{BotProcess, LaunchError, Supervisor};
use crate::runtime_adapter::{LadderArgs, LaunchRecipe, RuntimeAdapterRegistry};
use crate::stop::StopSignal;

/// Why a match stopped. `InProgress` is the only non-terminal case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitCase {
    InProgress,
    GameEnd,
    ClientRequestExit,
    ClientTimeout,
    GameTimeout,
}

impl ExitCase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExitCase::InProgress)
    }
}

impl Display for ExitCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Two averages within this many ms are considered equal.
const FRAME_EPSILON_MS: f32 = 0.001;

/// Both bot processes of a match. Killing them is guaranteed, even on early return.
struct Seats<P: BotProcess> {
    processes: [Option<P>; 2],
}

impl<P: BotProcess> Seats<P> {
    fn new() -> Self {
        Self {
            processes: [None, None],
        }
    }

    fn is_alive(&mut self, side: Side) -> bool {
        self.processes[side.index()]
            .as_mut()
            .is_some_and(|p| p.is_alive())
    }

    /// Each process leaves its seat when killed, so it is killed once.
    fn kill_all(&mut self) {
        for (i, seat) in self.processes.iter_mut().enumerate() {
            if let Some(mut process) = seat.take() {
                if let Err(e) = process.kill() {
                    error!("could not kill player {}: {e:#}", i + 1);
                }
            }
        }
    }
}

impl<P: BotProcess> Drop for Seats<P> {
    fn drop(&mut self) {
        self.kill_all();
    }
}

/// What the poll loop saw.
#[derive(Debug)]
struct Tracking {
    exit_case: ExitCase,
    state: GameState,
    reports: [SideReport; 2],
    last_activity: [Instant; 2],
    crashed: [bool; 2],
    attributed: Option<Side>,
}

impl Tracking {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            exit_case: ExitCase::InProgress,
            state: GameState::default(),
            reports: [SideReport::default(); 2],
            last_activity: [now, now],
            crashed: [false, false],
            attributed: None,
        }
    }
}

/// Runs matches. Borrowed registries and limits are never modified.
pub struct SessionDriver<'a, S: Supervisor> {
    supervisor: &'a S,
    runtimes: &'a RuntimeAdapterRegistry,
    builtins: &'a BuiltinRegistry,
    limits: &'a MatchLimits,
    ladder_server: String,
    policy: SimultaneousFailure,
    stop: StopSignal,
    replay_dir: Option<PathBuf>,
}

impl<'a, S: Supervisor> SessionDriver<'a, S> {
    pub fn new(
        supervisor: &'a S,
        runtimes: &'a RuntimeAdapterRegistry,
        builtins: &'a BuiltinRegistry,
        limits: &'a MatchLimits,
    ) -> Self {
        Self {
            supervisor,
            runtimes,
            builtins,
            limits,
            ladder_server: "127.0.0.1".to_string(),
            policy: SimultaneousFailure::default(),
            stop: StopSignal::new(),
            replay_dir: None,
        }
    }

    /// Address given to external bots to reach the engine.
    pub fn with_ladder_server(mut self, server: impl Into<String>) -> Self {
        self.ladder_server = server.into();
        self
    }

    pub fn with_policy(mut self, policy: SimultaneousFailure) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Directory handed to the engine for this match's replays.
    pub fn with_replay_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.replay_dir = dir;
        self
    }

    /// Play `matchup` on `engine`.
    ///
    /// Launch failures, crashes and timeouts are results. Only an engine failure is an error,
    /// and even then both bots are gone when this returns.
    #[instrument(skip_all, fields(matchup = %matchup))]
    pub fn run<E: GameEngine>(
        &self,
        engine: &mut E,
        matchup: &Matchup,
    ) -> anyhow::Result<GameResult> {
        let mut seats = Seats::<S::Process>::new();
        let mut participants = Vec::with_capacity(2);

        // process start order is not part of the contract
        for side in Side::BOTH {
            match self.launch_side(matchup, side) {
                Ok((process, participant)) => {
                    seats.processes[side.index()] = Some(process);
                    participants.push(participant);
                }
                Err(e) => {
                    warn!("{side} ({}) could not be launched: {e}", matchup.bot(side).name);
                    seats.kill_all();
                    return Ok(GameResult::initialization_error(Some(side), e.to_string()));
                }
            }
        }
        let participants: [Participant; 2] = match participants.try_into() {
            Ok(participants) => participants,
            Err(_) => unreachable!("one participant per side"),
        };

        let mut session = match engine.launch_match(participants, matchup.map(), self.replay_dir.as_deref()) {
            Ok(session) => session,
            Err(e) => {
                seats.kill_all();
                return Err(e.context("engine could not launch the match"));
            }
        };
        info!("match launched");

        let tracking = self.poll(engine, &mut session, matchup, &mut seats);
        let winner = engine.winner(&session);
        engine.close(session);
        seats.kill_all();
        let tracking = tracking?;

        let termination = Termination {
            launched: true,
            exit_case: tracking.exit_case,
            alive: [!tracking.crashed[0], !tracking.crashed[1]],
            engine_winner: winner,
            attributed: tracking.attributed,
        };
        let result = classify(&termination, self.policy);
        info!(
            exit_case = %tracking.exit_case,
            game_loop = tracking.state.game_loop,
            "{result}"
        );

        Ok(GameResult {
            bot1_avg_frame: tracking.reports[0].avg_frame_ms,
            bot2_avg_frame: tracking.reports[1].avg_frame_ms,
            exit_case: Some(tracking.exit_case),
            attributed: tracking.attributed,
            ..GameResult::new(result, tracking.state.game_loop)
        })
    }

    fn launch_side(
        &self,
        matchup: &Matchup,
        side: Side,
    ) -> Result<(S::Process, Participant), LaunchError> {
        let bot = matchup.bot(side);
        let recipe = self.runtimes.resolve(bot.kind)?;

        let (command, port) = match recipe {
            LaunchRecipe::InProcess => (None, 0),
            _ => {
                let ladder = LadderArgs {
                    game_port: reserve_port()?,
                    start_port: reserve_port()?,
                    server: self.ladder_server.clone(),
                    opponent_id: matchup.external_id(side.opponent()).map(String::from),
                };
                (recipe.command_for(bot, &ladder), ladder.game_port)
            }
        };

        // built before starting anything, so a bad registry never leaves a process behind
        let agent = match (&command, bot.kind) {
            (None, RuntimeKind::Builtin) => Some(self.builtins.construct(&bot.name)?),
            _ => None,
        };

        let process = self
            .supervisor
            .start(bot, command.as_ref(), matchup.checksum(side))?;

        let participant = match (command, agent) {
            (Some(_), _) => Participant::External {
                name: bot.name.clone(),
                race: bot.race,
                port,
                pid: process.pid(),
            },
            (None, Some(agent)) => Participant::InProcess {
                name: bot.name.clone(),
                race: bot.race,
                agent,
            },
            (None, None) => Participant::Computer {
                race: bot.race,
                difficulty: bot.difficulty,
            },
        };
        debug!("{side} ready: {participant:?}");
        Ok((process, participant))
    }

    fn poll<E: GameEngine>(
        &self,
        engine: &mut E,
        session: &mut E::Session,
        matchup: &Matchup,
        seats: &mut Seats<S::Process>,
    ) -> anyhow::Result<Tracking> {
        let mut tracking = Tracking::new();

        while !tracking.exit_case.is_terminal() {
            if self.stop.is_abort_requested() {
                warn!("match aborted by operator");
                break;
            }

            let continues = engine.advance(session)?;
            tracking.state = engine.read_state(session);
            trace!(game_loop = tracking.state.game_loop, continues);
            let game_over = !continues || !tracking.state.is_in_game;

            let dead = Side::BOTH.map(|side| !seats.is_alive(side));
            for side in Side::BOTH {
                if dead[side.index()] {
                    warn!("{side} ({}) is not running anymore", matchup.bot(side).name);
                }
            }

            if game_over {
                tracking.exit_case = ExitCase::GameEnd;
                // a single dead side ended the game, both gone means they quit with it
                if let Some(side) = lone_side(dead) {
                    tracking.crashed[side.index()] = true;
                    tracking.attributed = Some(side);
                }
                break;
            }

            // the engine still expects both sides
            if dead.iter().any(|d| *d) {
                tracking.crashed = dead;
                tracking.exit_case = ExitCase::ClientTimeout;
                tracking.attributed = lone_side(dead);
                break;
            }

            let now = Instant::now();
            for side in Side::BOTH {
                let report = engine.side_report(session, side);
                let i = side.index();
                if report.actions > tracking.reports[i].actions {
                    tracking.last_activity[i] = now;
                }
                tracking.reports[i] = report;
            }

            if let Some(leaver) = Side::BOTH
                .into_iter()
                .find(|side| tracking.reports[side.index()].requested_exit)
            {
                info!("{leaver} requested to leave");
                tracking.exit_case = ExitCase::ClientRequestExit;
                tracking.attributed = Some(leaver);
                break;
            }

            if tracking.state.game_loop > self.limits.max_game_loop {
                info!(
                    "game loop budget exceeded ({} > {})",
                    tracking.state.game_loop, self.limits.max_game_loop
                );
                tracking.exit_case = ExitCase::GameTimeout;
                break;
            }

            let silent = Side::BOTH.map(|side| {
                !matchup.bot(side).skeleton
                    && now.duration_since(tracking.last_activity[side.index()])
                        > self.limits.client_timeout
            });
            if silent.iter().any(|s| *s) {
                tracking.exit_case = ExitCase::ClientTimeout;
                tracking.attributed = blame(silent, &tracking.reports);
                warn!(
                    "client timeout after {:?} of silence, blamed: {:?}",
                    self.limits.client_timeout, tracking.attributed
                );
                break;
            }

            std::thread::sleep(self.limits.poll_interval);
        }

        Ok(tracking)
    }
}

/// The only flagged side, if exactly one is.
fn lone_side(flags: [bool; 2]) -> Option<Side> {
    match flags {
        [true, false] => Some(Side::Player1),
        [false, true] => Some(Side::Player2),
        _ => None,
    }
}

/// Side to blame among the silent ones. The slower side is blamed when both are silent.
fn blame(silent: [bool; 2], reports: &[SideReport; 2]) -> Option<Side> {
    match silent {
        [true, false] => Some(Side::Player1),
        [false, true] => Some(Side::Player2),
        [true, true] => {
            let (a, b) = (reports[0].avg_frame_ms, reports[1].avg_frame_ms);
            if (a - b).abs() <= FRAME_EPSILON_MS {
                None
            } else if a > b {
                Some(Side::Player1)
            } else {
                Some(Side::Player2)
            }
        }
        [false, false] => None,
    }
}

/// Free local port, found by binding port 0.
fn reserve_port() -> Result<u16, LaunchError> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(LaunchError::Ports)?;
    let port = listener.local_addr().map_err(LaunchError::Ports)?.port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        path::Path,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use super::*;
    use crate::bot::{BotConfig, Race};
    use crate::builtin::BuiltinAgent;
    use crate::classifier::ResultType;
    use crate::limits::MatchLimitsBuilder;
    use crate::runtime_adapter::{CommandLine, RuntimePaths};

    /// Shared view on a fake process.
    #[derive(Clone, Default)]
    struct Controls {
        dead: Arc<AtomicBool>,
        kills: Arc<AtomicUsize>,
    }

    struct FakeProcess {
        controls: Controls,
    }

    impl BotProcess for FakeProcess {
        fn is_alive(&mut self) -> bool {
            !self.controls.dead.load(Ordering::SeqCst)
        }

        fn kill(&mut self) -> anyhow::Result<()> {
            self.controls.kills.fetch_add(1, Ordering::SeqCst);
            self.controls.dead.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn pid(&self) -> Option<u32> {
            Some(1)
        }
    }

    /// Hands out processes whose liveness the test controls, by bot name.
    #[derive(Default)]
    struct FakeSupervisor {
        controls: Mutex<Vec<(String, Controls)>>,
        failing: Option<String>,
        started: AtomicUsize,
    }

    impl FakeSupervisor {
        fn failing(name: &str) -> Self {
            Self {
                failing: Some(name.to_string()),
                ..Self::default()
            }
        }

        fn controls(&self, name: &str) -> Controls {
            self.controls
                .lock()
                .unwrap()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, p)| p.clone())
                .expect("bot never started")
        }
    }

    impl Supervisor for FakeSupervisor {
        type Process = FakeProcess;

        fn start(
            &self,
            bot: &BotConfig,
            command: Option<&CommandLine>,
            _checksum: Option<&str>,
        ) -> Result<FakeProcess, LaunchError> {
            if self.failing.as_deref() == Some(bot.name.as_str()) {
                let path = command.map(|c| c.program.clone()).unwrap_or_default();
                return Err(LaunchError::ExecutableNotFound(path));
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            let controls = Controls::default();
            self.controls
                .lock()
                .unwrap()
                .push((bot.name.clone(), controls.clone()));
            Ok(FakeProcess { controls })
        }
    }

    /// One step of a scripted engine.
    #[derive(Clone, Copy, Default)]
    struct Step {
        continues: bool,
        game_loop: u32,
        actions: [u64; 2],
        avg_frame_ms: [f32; 2],
        leave: Option<Side>,
    }

    #[derive(Default)]
    struct ScriptedEngine {
        script: VecDeque<Step>,
        /// Repeated once the script is exhausted.
        last: Step,
        winner: Option<Side>,
        launched: usize,
        closed: usize,
        on_step: Option<Box<dyn FnMut(u32)>>,
        unreachable: bool,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: script.into(),
                ..Self::default()
            }
        }
    }

    impl GameEngine for ScriptedEngine {
        type Session = Step;

        fn launch_match(
            &mut self,
            participants: [Participant; 2],
            _map: &str,
            _replay_dir: Option<&Path>,
        ) -> anyhow::Result<Step> {
            if self.unreachable {
                anyhow::bail!("connection refused");
            }
            assert_eq!(participants.len(), 2);
            self.launched += 1;
            Ok(Step::default())
        }

        fn advance(&mut self, session: &mut Step) -> anyhow::Result<bool> {
            *session = match self.script.pop_front() {
                Some(step) => {
                    self.last = step;
                    step
                }
                None => Step {
                    game_loop: session.game_loop + 1,
                    ..self.last
                },
            };
            if let Some(hook) = &mut self.on_step {
                hook(session.game_loop);
            }
            Ok(session.continues)
        }

        fn read_state(&self, session: &Step) -> GameState {
            GameState {
                is_in_game: session.continues,
                game_loop: session.game_loop,
                score: 0.0,
            }
        }

        fn winner(&self, _session: &Step) -> Option<Side> {
            self.winner
        }

        fn side_report(&self, session: &Step, side: Side) -> SideReport {
            SideReport {
                actions: session.actions[side.index()],
                avg_frame_ms: session.avg_frame_ms[side.index()],
                requested_exit: session.leave == Some(side),
            }
        }

        fn close(&mut self, _session: Step) {
            self.closed += 1;
        }
    }

    /// Both sides act on every step.
    fn busy(game_loop: u32) -> Step {
        Step {
            continues: true,
            game_loop,
            actions: [game_loop as u64; 2],
            avg_frame_ms: [1.0, 1.0],
            leave: None,
        }
    }

    fn busy_script(steps: u32) -> Vec<Step> {
        (1..=steps).map(busy).collect()
    }

    fn end(game_loop: u32) -> Step {
        Step {
            continues: false,
            ..busy(game_loop)
        }
    }

    fn matchup() -> Matchup {
        Matchup::new(
            BotConfig::new(RuntimeKind::BinaryCpp, "botA", Race::Terran, "/bots/a", "botA"),
            BotConfig::new(RuntimeKind::Python, "botB", Race::Zerg, "/bots/b", "botB.py"),
            "TestMapLE",
        )
    }

    fn limits(client_timeout: Duration, max_game_loop: u32) -> MatchLimits {
        MatchLimitsBuilder::new()
            .with_client_timeout(client_timeout)
            .with_max_game_loop(max_game_loop)
            .with_poll_interval(Duration::from_millis(1))
            .with_ram_per_bot(1)
            .build()
            .unwrap()
    }

    struct Fixture {
        runtimes: RuntimeAdapterRegistry,
        builtins: BuiltinRegistry,
        limits: MatchLimits,
    }

    impl Fixture {
        fn new(limits: MatchLimits) -> Self {
            Self {
                runtimes: RuntimeAdapterRegistry::with_defaults(&RuntimePaths::default()),
                builtins: BuiltinRegistry::new(),
                limits,
            }
        }

        fn driver<'a>(&'a self, supervisor: &'a FakeSupervisor) -> SessionDriver<'a, FakeSupervisor> {
            SessionDriver::new(supervisor, &self.runtimes, &self.builtins, &self.limits)
        }
    }

    #[test]
    fn game_end_with_winner() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::default();
        let mut script = busy_script(41);
        script.push(end(42));
        let mut engine = ScriptedEngine::new(script);
        engine.winner = Some(Side::Player1);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.result, ResultType::Player1Win);
        assert_eq!(result.game_loop, 42);
        assert_eq!(result.exit_case, Some(ExitCase::GameEnd));
        assert_eq!(engine.closed, 1);
        for name in ["botA", "botB"] {
            assert_eq!(supervisor.controls(name).kills.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn game_end_without_winner_is_a_tie() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::default();
        let mut engine = ScriptedEngine::new(vec![busy(1), end(2)]);
        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();
        assert_eq!(result.result, ResultType::Tie);
    }

    #[test]
    fn launch_failure_never_reaches_the_engine() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::failing("botA");
        let mut engine = ScriptedEngine::new(vec![end(1)]);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.result, ResultType::InitializationError);
        assert_eq!(result.attributed, Some(Side::Player1));
        assert_eq!(result.exit_case, None);
        assert_eq!(engine.launched, 0);
        assert_eq!(supervisor.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_side_failure_kills_the_first() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::failing("botB");
        let mut engine = ScriptedEngine::new(vec![end(1)]);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.result, ResultType::InitializationError);
        assert_eq!(result.attributed, Some(Side::Player2));
        assert_eq!(engine.launched, 0);
        assert_eq!(supervisor.controls("botA").kills.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_runtime_is_an_initialization_error() {
        let mut fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        fixture.runtimes = RuntimeAdapterRegistry::empty();
        let supervisor = FakeSupervisor::default();
        let mut engine = ScriptedEngine::new(vec![end(1)]);
        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();
        assert_eq!(result.result, ResultType::InitializationError);
        assert!(result.detail.unwrap().contains("no launch recipe"));
    }

    #[test]
    fn crash_is_attributed_to_the_dead_side_both_ways() {
        for dead in Side::BOTH {
            let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
            let supervisor = Arc::new(FakeSupervisor::default());
            let mut engine = ScriptedEngine::new(busy_script(100));
            let victim = matchup().bot(dead).name.clone();
            let hook_supervisor = supervisor.clone();
            engine.on_step = Some(Box::new(move |game_loop| {
                if game_loop == 10 {
                    hook_supervisor
                        .controls(&victim)
                        .dead
                        .store(true, Ordering::SeqCst);
                }
            }));

            let result = fixture
                .driver(&supervisor)
                .run(&mut engine, &matchup())
                .unwrap();

            assert_eq!(result.result, ResultType::crash_of(dead));
            assert_eq!(result.attributed, Some(dead));
            assert_eq!(result.game_loop, 10);
        }
    }

    #[test]
    fn a_crash_that_ends_the_game_is_still_a_crash() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = Arc::new(FakeSupervisor::default());
        let mut script = busy_script(9);
        script.push(end(10));
        let mut engine = ScriptedEngine::new(script);
        engine.winner = Some(Side::Player2);
        let hook_supervisor = supervisor.clone();
        engine.on_step = Some(Box::new(move |game_loop| {
            if game_loop == 10 {
                hook_supervisor.controls("botA").dead.store(true, Ordering::SeqCst);
            }
        }));

        let result = fixture
            .driver(&supervisor)
            .run(&mut engine, &matchup())
            .unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::GameEnd));
        assert_eq!(result.result, ResultType::Player1Crash);
        assert_eq!(result.attributed, Some(Side::Player1));
        assert_eq!(supervisor.controls("botA").kills.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn both_sides_quitting_with_the_game_is_a_normal_end() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = Arc::new(FakeSupervisor::default());
        let mut engine = ScriptedEngine::new(vec![busy(1), end(2)]);
        engine.winner = Some(Side::Player1);
        let hook_supervisor = supervisor.clone();
        engine.on_step = Some(Box::new(move |game_loop| {
            if game_loop == 2 {
                for name in ["botA", "botB"] {
                    hook_supervisor.controls(name).dead.store(true, Ordering::SeqCst);
                }
            }
        }));

        let result = fixture
            .driver(&supervisor)
            .run(&mut engine, &matchup())
            .unwrap();

        assert_eq!(result.result, ResultType::Player1Win);
        assert_eq!(result.attributed, None);
    }

    #[test]
    fn nobody_responding_is_a_timeout_and_kills_both() {
        let fixture = Fixture::new(limits(Duration::from_millis(30), 1_000_000));
        let supervisor = FakeSupervisor::default();
        let silent = Step {
            continues: true,
            ..Step::default()
        };
        let mut engine = ScriptedEngine::new(vec![silent]);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::ClientTimeout));
        assert_eq!(result.result, ResultType::Timeout);
        for name in ["botA", "botB"] {
            assert_eq!(supervisor.controls(name).kills.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn silent_side_loses() {
        let fixture = Fixture::new(limits(Duration::from_millis(30), 1_000_000));
        let supervisor = FakeSupervisor::default();
        // player 2 acts on every step, player 1 never does
        let script = (1..=5000)
            .map(|game_loop| Step {
                continues: true,
                game_loop,
                actions: [0, game_loop as u64],
                avg_frame_ms: [0.0, 2.0],
                leave: None,
            })
            .collect();
        let mut engine = ScriptedEngine::new(script);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::ClientTimeout));
        assert_eq!(result.attributed, Some(Side::Player1));
        assert_eq!(result.result, ResultType::Player2Win);
    }

    #[test]
    fn slower_side_is_blamed_when_both_are_silent() {
        let reports = [
            SideReport {
                avg_frame_ms: 40.0,
                ..SideReport::default()
            },
            SideReport {
                avg_frame_ms: 5.0,
                ..SideReport::default()
            },
        ];
        assert_eq!(blame([true, true], &reports), Some(Side::Player1));
        assert_eq!(blame([true, true], &[reports[1], reports[0]]), Some(Side::Player2));
        assert_eq!(blame([true, true], &[reports[1], reports[1]]), None);
        assert_eq!(blame([false, true], &reports), Some(Side::Player2));
    }

    #[test]
    fn step_budget_is_a_game_timeout() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 50));
        let supervisor = FakeSupervisor::default();
        let mut engine = ScriptedEngine::new(busy_script(200));

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::GameTimeout));
        assert_eq!(result.result, ResultType::Timeout);
        assert_eq!(result.game_loop, 51);
    }

    #[test]
    fn leaving_forfeits() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::default();
        let mut script = busy_script(5);
        script.push(Step {
            leave: Some(Side::Player2),
            ..busy(6)
        });
        let mut engine = ScriptedEngine::new(script);

        let result = fixture.driver(&supervisor).run(&mut engine, &matchup()).unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::ClientRequestExit));
        assert_eq!(result.result, ResultType::Player1Win);
    }

    #[test]
    fn skeleton_bots_are_never_silent() {
        let fixture = Fixture::new(limits(Duration::from_millis(20), 300));
        let supervisor = FakeSupervisor::default();
        let m = Matchup::new(
            matchup().bot(Side::Player1).clone().with_skeleton(true),
            matchup().bot(Side::Player2).clone().with_skeleton(true),
            "TestMapLE",
        );
        let mut engine = ScriptedEngine::new(vec![]);
        engine.last = Step {
            continues: true,
            ..Step::default()
        };
        // slow enough for the client budget to elapse many times over
        engine.on_step = Some(Box::new(|_| std::thread::sleep(Duration::from_micros(200))));

        let result = fixture.driver(&supervisor).run(&mut engine, &m).unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::GameTimeout));
    }

    #[test]
    fn unreachable_engine_is_an_error_and_cleans_up() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        let supervisor = FakeSupervisor::default();
        let mut engine = ScriptedEngine::new(vec![]);
        engine.unreachable = true;

        let err = fixture
            .driver(&supervisor)
            .run(&mut engine, &matchup())
            .unwrap_err();

        assert!(format!("{err:#}").contains("connection refused"));
        for name in ["botA", "botB"] {
            assert_eq!(supervisor.controls(name).kills.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn abort_cancels_between_steps() {
        let fixture = Fixture::new(limits(Duration::from_secs(10), 1_000_000));
        let supervisor = FakeSupervisor::default();
        let stop = StopSignal::new();
        let mut engine = ScriptedEngine::new(vec![busy(1)]);
        let hook_stop = stop.clone();
        engine.on_step = Some(Box::new(move |game_loop| {
            if game_loop == 3 {
                hook_stop.request_abort();
            }
        }));

        let result = fixture
            .driver(&supervisor)
            .with_stop(stop)
            .run(&mut engine, &matchup())
            .unwrap();

        assert_eq!(result.exit_case, Some(ExitCase::InProgress));
        assert_eq!(result.result, ResultType::Error);
        assert_eq!(result.game_loop, 3);
    }

    struct Idle;

    impl BuiltinAgent for Idle {
        fn display_name(&self) -> &str {
            "Idle"
        }
    }

    #[test]
    fn builtin_and_computer_sides_have_no_process() {
        let mut fixture = Fixture::new(limits(Duration::from_secs(10), 1000));
        fixture.builtins.register("idle", "Idle", || Box::new(Idle));
        let supervisor = FakeSupervisor::default();
        let m = Matchup::new(
            BotConfig::new(RuntimeKind::Builtin, "idle", Race::Protoss, "", ""),
            BotConfig::computer("ai", Race::Zerg, Default::default()),
            "TestMapLE",
        );
        let mut engine = ScriptedEngine::new(vec![busy(1), end(2)]);
        engine.winner = Some(Side::Player2);

        let result = fixture.driver(&supervisor).run(&mut engine, &m).unwrap();
        assert_eq!(result.result, ResultType::Player2Win);

        // unknown builtin
        let m = Matchup::new(
            BotConfig::new(RuntimeKind::Builtin, "ghost", Race::Protoss, "", ""),
            BotConfig::computer("ai", Race::Zerg, Default::default()),
            "TestMapLE",
        );
        let result = fixture.driver(&supervisor).run(&mut engine, &m).unwrap();
        assert_eq!(result.result, ResultType::InitializationError);
    }
}
