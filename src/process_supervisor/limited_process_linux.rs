use std::{
    process::Child,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use anyhow::{self, Context};
use cgroups_rs::Cgroup;
use tracing::warn;

use super::{create_process, LaunchFailure, ProcessLimits};
use crate::runtime_adapter::CommandLine;

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let stdout = output.stdout;
    let untrimed_id = std::str::from_utf8(&stdout).context("id is not a valid string")?;
    Ok(untrimed_id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create a cgroup at `path`.
///
/// * `max_memory` - Maximum available memory in Bytes. Non-positive means no restriction.
/// * `max_pids` - Maximum number of PIDS inside the cgroup at any time. Non-positive means no restriction.
/// * `cpus` - which cpus the members can run one ("1-5,7", "1,3,4", ...). Empty string means no restriction.
fn create_cgroup(path: &str, max_memory: i64, max_pids: i64, cpus: &str) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if max_memory > 0 {
        builder = builder.memory().memory_hard_limit(max_memory).done();
    }
    if max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(max_pids))
            .done();
    }
    if !cpus.is_empty() {
        builder = builder.cpu().cpus(cpus.to_string()).done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

fn wait_for_process_cleanup(cgroup: &Cgroup, pid: u64, max_duration: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            anyhow::bail!("process {pid} still in its cgroup after {max_duration:?}");
        }
        std::thread::sleep(std::cmp::min(Duration::from_millis(10), max_duration / 10));
    }
    Ok(())
}

/// A bot process, possibly locked in its own cgroup.
#[derive(Debug)]
pub(crate) struct LimitedProcess {
    pub child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        command: &CommandLine,
        limits: &ProcessLimits,
        allow_stderr: bool,
    ) -> Result<LimitedProcess, LaunchFailure> {
        // one cgroup per process, even with several ladders in the same process
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        let user_id = get_current_user_id()
            .context("could not get user id")
            .map_err(LaunchFailure::Containment)?;
        let group_name = format!(
            "LADDER_BOT_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        if !cgroups_rs::hierarchies::is_cgroup2_unified_mode() {
            return Err(LaunchFailure::Containment(anyhow::anyhow!(
                "cgroup v2 unified hierarchy not available"
            )));
        }
        let path = get_cgroup_path(&user_id, &group_name);
        let group = create_cgroup(&path, limits.max_memory_bytes(), 100, &limits.cpus)
            .map_err(LaunchFailure::Containment)?;

        let mut child = match create_process(command, allow_stderr) {
            Ok(child) => child,
            Err(e) => {
                let _ = group.delete();
                return Err(LaunchFailure::Spawn(e));
            }
        };

        let pid = child.id() as u64;
        if let Err(e) = group.add_task_by_tgid(cgroups_rs::CgroupPid { pid }) {
            let kill = child.kill().and_then(|_| child.wait().map(|_| ()));
            let _ = group.delete();
            let msg = match kill {
                Ok(()) => format!("could not add process to cgroup ({e})"),
                Err(err) => format!(
                    "could not add process to cgroup ({e}), and process could not be killed either ({err})"
                ),
            };
            return Err(LaunchFailure::Containment(anyhow::anyhow!(msg)));
        }

        Ok(LimitedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    pub fn launch_without_container(
        command: &CommandLine,
        allow_stderr: bool,
    ) -> Result<LimitedProcess, LaunchFailure> {
        let child = create_process(command, allow_stderr).map_err(LaunchFailure::Spawn)?;
        Ok(LimitedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    /// Kill the process (and everything in its cgroup) and wait until it is gone.
    ///
    /// Killing an already exited process is fine. If the cgroup cannot be killed, the process
    /// itself is.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        if let Some(cgroup) = &self.cgroup {
            let pid = self.child.id() as u64;
            let contained = cgroup
                .kill()
                .context("could not kill cgroup")
                .and_then(|_| wait_for_process_cleanup(cgroup, pid, max_duration));
            match contained {
                Ok(()) => {
                    // reap
                    let _ = self.child.wait();
                    self.cleaned_up = true;
                }
                Err(e) => warn!("{e:#}, killing process {pid} directly"),
            }
        }
        if !self.cleaned_up {
            self.kill_child()?;
        }
        if let Some(cgroup) = self.cgroup.take() {
            if let Err(e) = cgroup.delete() {
                warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
            }
        }
        Ok(())
    }

    fn kill_child(&mut self) -> anyhow::Result<()> {
        if self.child.try_wait().context("could not poll process")?.is_none() {
            self.child.kill().context("could not kill process")?;
        }
        self.child.wait().context("could not reap process")?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_secs(1);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                tracing::error!(
                    "could not kill process {} on LimitedProcess::drop: {e:#}",
                    self.child.id()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper() -> CommandLine {
        CommandLine {
            program: "sleep".into(),
            args: vec!["30".into()],
            working_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn failed_cgroup_kill_still_kills_the_process() {
        let mut process = LimitedProcess::launch_without_container(&sleeper(), false)
            .map_err(|_| "spawn failed")
            .unwrap();
        // never created, so killing it fails whatever the cgroup version
        process.cgroup = Some(Cgroup::load(
            cgroups_rs::hierarchies::auto(),
            "LADDER_BOT_never_created",
        ));
        let pid = process.child.id();

        process.try_kill(Duration::from_millis(100)).unwrap();

        assert!(process.cleaned_up);
        assert!(process.cgroup.is_none());
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    #[test]
    fn uncontained_kill_is_idempotent() {
        let mut process = LimitedProcess::launch_without_container(&sleeper(), false)
            .map_err(|_| "spawn failed")
            .unwrap();
        process.try_kill(Duration::from_millis(100)).unwrap();
        process.try_kill(Duration::from_millis(100)).unwrap();
        assert!(process.child.try_wait().unwrap().is_some());
    }
}
