//! Keeping the replays of finished matches.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{debug, instrument};

/// Stores what a match left in its replay directory. Failures never affect the match result.
pub trait ReplayArchiver: Send + Sync {
    fn archive(&self, match_id: &str, replay_dir: &Path) -> anyhow::Result<PathBuf>;
}

/// Moves replays into `archive_dir/<match_id>/`.
#[derive(Debug, Clone)]
pub struct DirectoryArchiver {
    archive_dir: PathBuf,
}

impl DirectoryArchiver {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }
}

impl ReplayArchiver for DirectoryArchiver {
    #[instrument(skip(self))]
    fn archive(&self, match_id: &str, replay_dir: &Path) -> anyhow::Result<PathBuf> {
        let entries = fs::read_dir(replay_dir)
            .with_context(|| format!("could not read replay dir {}", replay_dir.display()))?;
        let target = self.archive_dir.join(match_id);
        fs::create_dir_all(&target)
            .with_context(|| format!("could not create {}", target.display()))?;

        let mut moved = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let destination = target.join(entry.file_name());
            move_file(&entry.path(), &destination).with_context(|| {
                format!(
                    "could not move {} to {}",
                    entry.path().display(),
                    destination.display()
                )
            })?;
            moved += 1;
        }
        debug!("{moved} replay file(s) archived in {}", target.display());
        Ok(target)
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // other filesystem
    fs::copy(from, to)?;
    fs::remove_file(from)
}
