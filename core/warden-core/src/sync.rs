//! Pre-restart workspace synchronisation.
//!
//! Roles that keep a persistent clone get a best-effort refresh before their
//! new session starts: fetch, rebase onto the main branch, then sync the
//! tracker mirror. Every step logs and carries on; conflicts are left for the
//! agent to resolve.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::command;
use crate::error::Result;

pub trait RepositorySync: Send + Sync {
    fn fetch(&self, dir: &Path, remote: &str) -> Result<()>;
    fn pull_rebase(&self, dir: &Path, remote: &str, branch: &str) -> Result<()>;
}

pub trait TrackerSync: Send + Sync {
    fn sync(&self, dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct GitRepositorySync {
    binary: String,
}

impl Default for GitRepositorySync {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitRepositorySync {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl RepositorySync for GitRepositorySync {
    fn fetch(&self, dir: &Path, remote: &str) -> Result<()> {
        command::run(&self.binary, &["fetch", remote], Some(dir)).map(|_| ())
    }

    fn pull_rebase(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        command::run(&self.binary, &["pull", "--rebase", remote, branch], Some(dir)).map(|_| ())
    }
}

/// Runs `<tracker> sync` in the workspace.
#[derive(Debug, Clone)]
pub struct CommandTrackerSync {
    binary: String,
}

impl Default for CommandTrackerSync {
    fn default() -> Self {
        Self::new("bd")
    }
}

impl CommandTrackerSync {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl TrackerSync for CommandTrackerSync {
    fn sync(&self, dir: &Path) -> Result<()> {
        command::run(&self.binary, &["sync"], Some(dir)).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceSyncReport {
    pub fetched: bool,
    pub rebased: bool,
    pub tracker_synced: bool,
}

impl WorkspaceSyncReport {
    pub fn is_clean(&self) -> bool {
        self.fetched && self.rebased && self.tracker_synced
    }
}

pub fn sync_workspace(
    repository: &dyn RepositorySync,
    tracker: &dyn TrackerSync,
    dir: &Path,
    remote: &str,
    branch: &str,
) -> WorkspaceSyncReport {
    let mut report = WorkspaceSyncReport::default();

    match repository.fetch(dir, remote) {
        Ok(()) => report.fetched = true,
        Err(err) => warn!(dir = %dir.display(), error = %err, "git fetch failed"),
    }

    match repository.pull_rebase(dir, remote, branch) {
        Ok(()) => report.rebased = true,
        Err(err) => warn!(dir = %dir.display(), error = %err, "git pull --rebase failed"),
    }

    match tracker.sync(dir) {
        Ok(()) => report.tracker_synced = true,
        Err(err) => warn!(dir = %dir.display(), error = %err, "Tracker sync failed"),
    }

    if report.is_clean() {
        debug!(dir = %dir.display(), "Workspace sync finished");
    } else {
        info!(
            dir = %dir.display(),
            report = ?report,
            "Workspace sync incomplete; agent will reconcile"
        );
    }
    report
}
