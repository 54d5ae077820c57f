use std::{process::Child, time::Duration};

use anyhow::{self, Context};

use super::{create_process, LaunchFailure, ProcessLimits};
use crate::runtime_adapter::CommandLine;

#[derive(Debug)]
pub(crate) struct LimitedProcess {
    pub child: Child,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        _command: &CommandLine,
        _limits: &ProcessLimits,
        _allow_stderr: bool,
    ) -> Result<LimitedProcess, LaunchFailure> {
        Err(LaunchFailure::Containment(anyhow::anyhow!(
            "cgroups only available on linux"
        )))
    }

    pub fn launch_without_container(
        command: &CommandLine,
        allow_stderr: bool,
    ) -> Result<LimitedProcess, LaunchFailure> {
        let child = create_process(command, allow_stderr).map_err(LaunchFailure::Spawn)?;
        Ok(LimitedProcess {
            child,
            cleaned_up: false,
        })
    }

    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
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
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Duration::from_secs(1)) {
                tracing::error!(
                    "could not kill process {} on LimitedProcess::drop: {e:#}",
                    self.child.id()
                );
            }
        }
    }
}
