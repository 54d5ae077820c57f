//! Running a queue of matchups.
//!
//! The [`Scheduler`] pops matchups from the front of the queue and plays each of them exactly
//! once, serially by default or a bounded number at a time. Every match ends with a persisted
//! result, whatever happened to it: the queue always advances.
//!
//! Each match writes its replays to its own `<replay_dir>/<match_id>/`. Archival and persistence
//! happen on the calling thread only, one result at a time.
//!
//! [`run_ladder`] wires everything from a [`Configuration`]: bot file, matchup source, results
//! file, logger and OS supervisor.

use std::{
    collections::VecDeque,
    fs,
    io::IsTerminal,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::mpsc,
    thread,
};

use anyhow::Context;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::archive::{DirectoryArchiver, ReplayArchiver};
use crate::bot::Side;
use crate::bot_registry::BotRegistry;
use crate::builtin::BuiltinRegistry;
use crate::configuration::Configuration;
use crate::engine::EngineFactory;
use crate::game_result::GameResult;
use crate::limits::MatchLimits;
use crate::logger::init_logger;
use crate::matchup::Matchup;
use crate::matchup_source::{
    FallbackSource, FileMatchupSource, MatchupSource, RemoteMatchupSource,
};
use crate::process_supervisor::{OsSupervisor, Supervisor};
use crate::result_store::{JsonLinesResultStore, MatchRecord, ResultSink};
use crate::runtime_adapter::RuntimeAdapterRegistry;
use crate::session::SessionDriver;
use crate::stop::StopSignal;

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    /// Matches with a game outcome (win, crash, tie, timeout).
    pub successes: usize,
    /// Matches ending with `InitializationError` or `Error`.
    pub failures: usize,
    /// Matchups left in the queue, after a stop request.
    pub remaining: usize,
    pub results: Vec<MatchRecord>,
}

struct Finished {
    match_id: String,
    matchup: Matchup,
    result: GameResult,
}

/// Plays matchups, owns everything a match needs.
pub struct Scheduler<S> {
    supervisor: S,
    runtimes: RuntimeAdapterRegistry,
    builtins: BuiltinRegistry,
    limits: MatchLimits,
    config: Configuration,
    replays: Option<(PathBuf, Box<dyn ReplayArchiver>)>,
    stop: StopSignal,
}

impl<S: Supervisor + Sync> Scheduler<S> {
    /// Launch recipes come from the configured host paths. Replays are archived if the
    /// configuration names both a replay and an archive directory.
    pub fn new(supervisor: S, config: Configuration, limits: MatchLimits) -> Self {
        let replays = match (&config.replay_dir, &config.archive_dir) {
            (Some(replay_dir), Some(archive_dir)) => Some((
                replay_dir.clone(),
                Box::new(DirectoryArchiver::new(archive_dir)) as Box<dyn ReplayArchiver>,
            )),
            _ => None,
        };
        Self {
            supervisor,
            runtimes: RuntimeAdapterRegistry::with_defaults(&config.runtime_paths),
            builtins: BuiltinRegistry::new(),
            limits,
            config,
            replays,
            stop: StopSignal::new(),
        }
    }

    pub fn with_builtins(mut self, builtins: BuiltinRegistry) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_runtimes(mut self, runtimes: RuntimeAdapterRegistry) -> Self {
        self.runtimes = runtimes;
        self
    }

    pub fn with_archiver(
        mut self,
        replay_dir: impl Into<PathBuf>,
        archiver: impl ReplayArchiver + 'static,
    ) -> Self {
        self.replays = Some((replay_dir.into(), Box::new(archiver)));
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Shared with the running matches.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Play matchups until the queue is empty or a stop is requested.
    #[instrument(skip_all, fields(queued = queue.len()))]
    pub fn run<F: EngineFactory>(
        &self,
        factory: &F,
        queue: &mut VecDeque<Matchup>,
        sink: &mut dyn ResultSink,
    ) -> RunSummary {
        let max_running = self.config.max_concurrent_matches.max(1);
        let verbose = self.config.verbose;
        info!(max_running, "starting run");
        if verbose {
            disable_line_wrap();
        }

        let mut summary = RunSummary::default();
        let mut running = Vec::<String>::new();
        let (tx, rx) = mpsc::channel::<Finished>();

        thread::scope(|scope| {
            let mut in_flight = 0;
            let mut started = 0;
            loop {
                while in_flight < max_running && !self.stop.is_stop_requested() {
                    let Some(matchup) = queue.pop_front() else {
                        break;
                    };
                    started += 1;
                    let match_id = match_id(started, &matchup);

                    running.push(match_id.clone());
                    if verbose {
                        print_running_matches(&running);
                    }

                    let tx = tx.clone();
                    scope.spawn(move || {
                        let result = self.play(factory, &matchup, &match_id);
                        // the receiver outlives every worker
                        let _ = tx.send(Finished {
                            match_id,
                            matchup,
                            result,
                        });
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    break;
                }
                // in flight <=> result to receive
                let Ok(finished) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                running.retain(|id| id != &finished.match_id);
                self.complete(finished, sink, &mut summary);
            }
        });

        summary.remaining = queue.len();
        if verbose {
            enable_line_wrap();
        }
        if summary.remaining > 0 {
            warn!("run stopped with {} matchup(s) left", summary.remaining);
        }
        info!(
            processed = summary.processed,
            successes = summary.successes,
            failures = summary.failures,
            "run finished"
        );
        summary
    }

    /// One match, from engine creation to result. Never fails.
    fn play<F: EngineFactory>(
        &self,
        factory: &F,
        matchup: &Matchup,
        match_id: &str,
    ) -> GameResult {
        let replay_dir = self.replays.as_ref().and_then(|(root, _)| {
            let dir = root.join(match_id);
            match fs::create_dir_all(&dir) {
                Ok(()) => Some(dir),
                Err(e) => {
                    warn!("could not create replay dir {}: {e}", dir.display());
                    None
                }
            }
        });
        let driver = SessionDriver::new(
            &self.supervisor,
            &self.runtimes,
            &self.builtins,
            &self.limits,
        )
        .with_ladder_server(self.config.ladder_server.clone())
        .with_policy(self.config.simultaneous_failure)
        .with_stop(self.stop.clone())
        .with_replay_dir(replay_dir);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<GameResult> {
            let mut engine = factory.new_engine().context("could not create an engine")?;
            driver.run(&mut engine, matchup)
        }));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("{matchup}: {e:#}");
                GameResult::infrastructure_error(0, format!("{e:#}"))
            }
            Err(_) => {
                error!("{matchup}: match panicked");
                GameResult::infrastructure_error(0, "match panicked")
            }
        }
    }

    fn complete(&self, finished: Finished, sink: &mut dyn ResultSink, summary: &mut RunSummary) {
        let Finished {
            match_id,
            matchup,
            result,
        } = finished;
        trace!(?result);
        if self.config.verbose {
            print_result(&matchup, &result);
        }

        if let Some((root, archiver)) = &self.replays {
            let replay_dir = root.join(&match_id);
            match archiver.archive(&match_id, &replay_dir) {
                Ok(path) => {
                    debug!("replays of {match_id} archived in {}", path.display());
                    // only goes away once empty
                    let _ = fs::remove_dir(&replay_dir);
                }
                Err(e) => warn!("could not archive replays of {match_id}: {e:#}"),
            }
        }

        let record = MatchRecord::new(match_id, &matchup, result);
        if let Err(e) = sink.record(&record) {
            error!("could not persist result of {}: {e:#}", record.match_id);
        }

        summary.processed += 1;
        if record.result.result.is_failure() {
            summary.failures += 1;
        } else {
            summary.successes += 1;
        }
        summary.results.push(record);
    }
}

/// Everything [`Configuration`] describes, in one call.
///
/// Loads the bot file, fetches the matchups (remote list first when configured), and appends
/// every result to the results file. Pressing Enter on a terminal stops the run after the
/// running matches, pressing it again aborts them.
pub fn run_ladder<F: EngineFactory>(
    config: Configuration,
    limits: MatchLimits,
    builtins: BuiltinRegistry,
    factory: &F,
) -> anyhow::Result<RunSummary> {
    if config.log {
        init_logger(&config.log_dir)?;
    }
    trace!(?config, ?limits);

    let bots = BotRegistry::load(&config.bots_file)?;
    let local = FileMatchupSource::new(&config.matchup_list_file);
    let source: Box<dyn MatchupSource> = match &config.matchup_url {
        Some(url) => Box::new(FallbackSource::new(
            RemoteMatchupSource::new(url),
            local,
            config.matchup_fetch_retries,
        )),
        None => Box::new(local),
    };
    let mut queue = source
        .fetch(&bots)
        .with_context(|| format!("could not read matchups from {}", source.describe()))?;
    let mut store = JsonLinesResultStore::open(&config.results_file)?;

    let supervisor = OsSupervisor::new(limits.process().clone(), config.allow_uncontained)
        .with_stderr(config.debug_bot_stderr)
        .with_kill_timeout(limits.kill_timeout());
    let scheduler = Scheduler::new(supervisor, config, limits).with_builtins(builtins);
    if std::io::stdin().is_terminal() {
        scheduler.stop_signal().watch_stdin();
    }

    Ok(scheduler.run(factory, &mut queue, &mut store))
}

/// `<n>_<bot1>_vs_<bot2>`, usable as a directory name.
fn match_id(n: usize, matchup: &Matchup) -> String {
    let clean = |name: &str| {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>()
    };
    format!(
        "{n}_{}_vs_{}",
        clean(&matchup.bot(Side::Player1).name),
        clean(&matchup.bot(Side::Player2).name)
    )
}

fn print_result(matchup: &Matchup, result: &GameResult) {
    // clear line, green match, result, red detail, start of line
    println!(
        "\x1b[2K\x1b[32m{matchup}: \x1b[39m{} ({} steps) \x1b[31m{}\x1b[39m\x1b[0G",
        result.result,
        result.game_loop,
        result.detail.as_deref().unwrap_or_default()
    );
}

fn print_running_matches(running: &[String]) {
    // clear, green, default, start of line
    print!(
        "\x1b[2K\x1b[32mRunning...:\x1b[39m {}\x1b[0G",
        running.join(", ")
    );
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn disable_line_wrap() {
    print!("\x1b[?7l");
}

fn enable_line_wrap() {
    print!("\x1b[?7h");
}
