//! Starting, watching and killing one bot process.
//!
//! [`OsSupervisor::start`] verifies the bot's artifact, spawns the process (inside a cgroup on
//! Linux when possible) and hands back a [`ProcessHandle`]. A background thread watches the
//! process so that [`BotProcess::is_alive`] never blocks the session's poll loop.
//!
//! A handle is killed exactly once: explicitly through [`BotProcess::kill`] (idempotent), or
//! on drop if the owner forgot. In-process bots get a sentinel handle with no OS process behind
//! it.

#[cfg(target_os = "linux")]
mod limited_process_linux;
#[cfg(target_os = "linux")]
use limited_process_linux::LimitedProcess;

#[cfg(not(target_os = "linux"))]
mod limited_process_stub;
#[cfg(not(target_os = "linux"))]
use limited_process_stub::LimitedProcess;

use std::{
    io,
    path::{Path, PathBuf},
    process::{Child, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::bot::BotConfig;
use crate::runtime_adapter::{CommandLine, ConfigError};

/// Why a bot could not be started. The match is lost before it began.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("executable '{0}' not found")]
    ExecutableNotFound(PathBuf),
    #[error("invalid working directory '{0}'")]
    InvalidWorkingDirectory(PathBuf),
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("could not read '{path}' to verify its checksum: {source}")]
    ChecksumUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bot '{0}' runs in-process and has no artifact to verify")]
    ChecksumWithoutArtifact(String),
    #[error("could not spawn '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not contain process: {0:#}")]
    Containment(anyhow::Error),
    #[error("could not reserve a port: {0}")]
    Ports(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub(crate) enum LaunchFailure {
    Spawn(io::Error),
    Containment(anyhow::Error),
}

/// Memory and cpu limits applied to each contained bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessLimits {
    /// In MB. `None` means no limit.
    pub ram_per_bot: Option<usize>,
    /// Cpuset list ("0-3,6"). Empty means no restriction.
    pub cpus: String,
}

impl ProcessLimits {
    pub(crate) fn max_memory_bytes(&self) -> i64 {
        self.ram_per_bot
            .map(|mb| (mb as i64).saturating_mul(1_000_000))
            .unwrap_or(0)
    }
}

fn create_process(command: &CommandLine, allow_stderr: bool) -> io::Result<Child> {
    let mut cmd = std::process::Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null());
    if !allow_stderr {
        cmd.stderr(Stdio::null());
    }
    cmd.spawn()
}

/// Liveness and termination of one started bot.
pub trait BotProcess: Send {
    /// Non-blocking probe.
    fn is_alive(&mut self) -> bool;

    /// Forced termination. Returns once the process is gone; a no-op the second time.
    fn kill(&mut self) -> anyhow::Result<()>;

    /// `None` for in-process bots.
    fn pid(&self) -> Option<u32>;
}

/// Starts bot processes.
pub trait Supervisor {
    type Process: BotProcess;

    /// Start `bot` with `command`, or hand back a sentinel when `command` is `None`.
    ///
    /// A declared `checksum` is verified before anything is spawned.
    fn start(
        &self,
        bot: &BotConfig,
        command: Option<&CommandLine>,
        checksum: Option<&str>,
    ) -> Result<Self::Process, LaunchError>;
}

/// SHA-256 of a file, lowercase hex.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Fails unless the file at `path` hashes to `expected` (hex, any case).
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), LaunchError> {
    let actual = file_checksum(path).map_err(|source| LaunchError::ChecksumUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(LaunchError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Launches real OS processes.
#[derive(Debug, Clone)]
pub struct OsSupervisor {
    limits: ProcessLimits,
    allow_uncontained: bool,
    allow_stderr: bool,
    kill_timeout: Duration,
    monitor_interval: Duration,
}

impl OsSupervisor {
    pub fn new(limits: ProcessLimits, allow_uncontained: bool) -> Self {
        Self {
            limits,
            allow_uncontained,
            allow_stderr: false,
            kill_timeout: Duration::from_secs(1),
            monitor_interval: Duration::from_millis(10),
        }
    }

    /// Let the bots write to our stderr (debug purposes only).
    pub fn with_stderr(mut self, value: bool) -> Self {
        self.allow_stderr = value;
        self
    }

    /// How long a contained kill may wait for the cgroup to empty.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    fn check_paths(bot: &BotConfig, command: &CommandLine) -> Result<(), LaunchError> {
        if !command.working_dir.is_dir() {
            return Err(LaunchError::InvalidWorkingDirectory(
                command.working_dir.clone(),
            ));
        }
        let entry = bot.entry_path();
        if !entry.is_file() {
            return Err(LaunchError::ExecutableNotFound(entry));
        }
        // bare host names ("python") are looked up in PATH by spawn
        if command.program.components().count() > 1 && !command.program.is_file() {
            return Err(LaunchError::ExecutableNotFound(command.program.clone()));
        }
        Ok(())
    }

    fn spawn(&self, command: &CommandLine) -> Result<LimitedProcess, LaunchError> {
        let to_launch_error = |failure: LaunchFailure| match failure {
            LaunchFailure::Spawn(e) if e.kind() == io::ErrorKind::NotFound => {
                LaunchError::ExecutableNotFound(command.program.clone())
            }
            LaunchFailure::Spawn(source) => LaunchError::Spawn {
                program: command.program.clone(),
                source,
            },
            LaunchFailure::Containment(e) => LaunchError::Containment(e),
        };

        match LimitedProcess::launch(command, &self.limits, self.allow_stderr) {
            Ok(process) => Ok(process),
            Err(LaunchFailure::Containment(e)) if self.allow_uncontained => {
                warn!("running '{}' uncontained: {e:#}", command.program.display());
                LimitedProcess::launch_without_container(command, self.allow_stderr)
                    .map_err(to_launch_error)
            }
            Err(failure) => Err(to_launch_error(failure)),
        }
    }
}

impl Supervisor for OsSupervisor {
    type Process = ProcessHandle;

    #[instrument(skip_all, fields(bot = bot.name))]
    fn start(
        &self,
        bot: &BotConfig,
        command: Option<&CommandLine>,
        checksum: Option<&str>,
    ) -> Result<ProcessHandle, LaunchError> {
        let Some(command) = command else {
            if checksum.is_some() {
                return Err(LaunchError::ChecksumWithoutArtifact(bot.name.clone()));
            }
            debug!("in-process bot, nothing to start");
            return Ok(ProcessHandle::in_process(&bot.name));
        };

        Self::check_paths(bot, command)?;
        if let Some(expected) = checksum {
            verify_checksum(&bot.entry_path(), expected)?;
        }

        let process = self.spawn(command)?;
        let pid = process.child.id();
        info!(pid, "started {command}");
        Ok(ProcessHandle::supervised(
            &bot.name,
            process,
            self.kill_timeout,
            self.monitor_interval,
        ))
    }
}

struct Supervised {
    process: Arc<Mutex<LimitedProcess>>,
    exited: Arc<AtomicBool>,
    stop_monitor: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
    kill_timeout: Duration,
}

/// A started bot, or the sentinel of an in-process one.
pub struct ProcessHandle {
    name: String,
    pid: Option<u32>,
    started_at: Instant,
    exit_status: Arc<Mutex<Option<ExitStatus>>>,
    inner: Option<Supervised>,
    killed: bool,
}

impl ProcessHandle {
    fn in_process(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pid: None,
            started_at: Instant::now(),
            exit_status: Arc::new(Mutex::new(None)),
            inner: None,
            killed: false,
        }
    }

    fn supervised(
        name: &str,
        process: LimitedProcess,
        kill_timeout: Duration,
        monitor_interval: Duration,
    ) -> Self {
        let pid = process.child.id();
        let process = Arc::new(Mutex::new(process));
        let exited = Arc::new(AtomicBool::new(false));
        let stop_monitor = Arc::new(AtomicBool::new(false));
        let exit_status = Arc::new(Mutex::new(None));

        let monitor = {
            let process = process.clone();
            let exited = exited.clone();
            let stop = stop_monitor.clone();
            let exit_status = exit_status.clone();
            let name = name.to_string();
            std::thread::Builder::new()
                .name(format!("monitor-{name}"))
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        if let Some(status) = poll_exit(&process) {
                            debug!(bot = name, %status, "process exited");
                            *exit_status.lock().expect("poisoned") = Some(status);
                            exited.store(true, Ordering::Release);
                            break;
                        }
                        std::thread::sleep(monitor_interval);
                    }
                })
        };
        let monitor = match monitor {
            Ok(handle) => Some(handle),
            Err(e) => {
                // is_alive still polls the process itself
                warn!("could not spawn monitor thread for {name}: {e}");
                None
            }
        };

        Self {
            name: name.to_string(),
            pid: Some(pid),
            started_at: Instant::now(),
            exit_status,
            inner: Some(Supervised {
                process,
                exited,
                stop_monitor,
                monitor,
                kill_timeout,
            }),
            killed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since start.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Exit status, once the process ended on its own.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_status.lock().expect("poisoned")
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }
}

fn poll_exit(process: &Mutex<LimitedProcess>) -> Option<ExitStatus> {
    let mut guard = process.lock().expect("poisoned");
    match guard.child.try_wait() {
        Ok(status) => status,
        Err(e) => {
            warn!("could not poll process {}: {e}", guard.child.id());
            None
        }
    }
}

impl BotProcess for ProcessHandle {
    fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        let Some(inner) = &self.inner else {
            return true;
        };
        if inner.exited.load(Ordering::Acquire) {
            return false;
        }
        // never wait for the monitor, it will catch up
        let Ok(mut guard) = inner.process.try_lock() else {
            return true;
        };
        match guard.child.try_wait() {
            Ok(Some(status)) => {
                *self.exit_status.lock().expect("poisoned") = Some(status);
                inner.exited.store(true, Ordering::Release);
                false
            }
            _ => true,
        }
    }

    #[instrument(skip(self), fields(bot = self.name))]
    fn kill(&mut self) -> anyhow::Result<()> {
        if self.killed {
            return Ok(());
        }
        let Some(inner) = &mut self.inner else {
            self.killed = true;
            return Ok(());
        };
        inner.stop_monitor.store(true, Ordering::Release);
        if let Some(monitor) = inner.monitor.take() {
            let _ = monitor.join();
        }
        // still alive as far as callers know until the kill went through
        inner
            .process
            .lock()
            .expect("poisoned")
            .try_kill(inner.kill_timeout)?;
        self.killed = true;
        debug!("killed after {:?}", self.started_at.elapsed());
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.killed {
            warn!("{} was not killed before drop, killing it now", self.name);
            if let Err(e) = self.kill() {
                tracing::error!("could not kill {}: {e:#}", self.name);
            }
        }
    }
}
