//! Lifecycle action execution.
//!
//! ## State Machine
//!
//! ```text
//! Received ──verify──▶ Verified ──▶ Executing ──▶ Completed
//!     │                                 │
//!     └────── precondition failed ──────┴──▶ Failed
//! ```
//!
//! Shutdown kills the session if present and stops there. Restart and Cycle
//! behave identically: kill, settle, optionally sync the workspace, create a
//! fresh session, decorate it, launch the agent, then clear the request flag.
//!
//! Fatal steps: the session-exists check, kill, create, and sending the
//! startup command. Workspace sync, environment, theming, and flag clearing
//! only log on failure.

use serde::Serialize;
use std::fmt;
use std::thread;
use tracing::{debug, info, warn};

use crate::agent_state;
use crate::config::SupervisorConfig;
use crate::error::WardenError;
use crate::identity::{AgentIdentity, AgentProjection};
use crate::request::LifecycleAction;
use crate::session::SessionHost;
use crate::status::{self, StatusSource};
use crate::sync::{sync_workspace, RepositorySync, TrackerSync, WorkspaceSyncReport};
use crate::theme::SessionDecoration;

pub const ROLE_ENV: &str = "GT_ROLE";
pub const ACTOR_ENV: &str = "BD_ACTOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Received,
    Verified,
    Executing,
    Completed,
    Failed,
}

/// Step at which a fatal execution error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    SessionCheck,
    Kill,
    Create,
    StartupCommand,
}

#[derive(Debug)]
pub struct ExecutionFailure {
    pub stage: FailureStage,
    pub error: WardenError,
}

impl ExecutionFailure {
    fn at(stage: FailureStage) -> impl FnOnce(WardenError) -> Self {
        move |error| Self { stage, error }
    }

    /// The agent is left without a session and its request flag still set.
    pub fn needs_recreate(&self) -> bool {
        self.stage == FailureStage::Create
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failed: {}", self.stage, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub was_running: bool,
    pub killed: bool,
    pub created: bool,
    pub workspace_sync: Option<WorkspaceSyncReport>,
    pub environment_set: bool,
    pub themed: bool,
    pub flag_cleared: bool,
}

#[derive(Debug)]
pub enum RunResult {
    Completed(ExecutionReport),
    PreconditionFailed(WardenError),
    Failed(ExecutionFailure),
}

/// One pass through the state machine, with every phase it visited.
#[derive(Debug)]
pub struct ActionRun {
    pub session_name: String,
    pub action: LifecycleAction,
    pub phases: Vec<ExecutionPhase>,
    pub result: RunResult,
}

impl ActionRun {
    pub fn phase(&self) -> ExecutionPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(ExecutionPhase::Received)
    }

    fn advance(&mut self, next: ExecutionPhase) {
        debug!(
            session = %self.session_name,
            action = %self.action,
            from = ?self.phase(),
            to = ?next,
            "Lifecycle phase transition"
        );
        self.phases.push(next);
    }
}

pub struct ActionExecutor<'a> {
    pub config: &'a SupervisorConfig,
    pub sessions: &'a dyn SessionHost,
    pub repository: &'a dyn RepositorySync,
    pub tracker: &'a dyn TrackerSync,
    pub status: &'a dyn StatusSource,
}

impl ActionExecutor<'_> {
    /// Verifies readiness, then executes. Never panics, never propagates.
    pub fn run(
        &self,
        identity: &AgentIdentity,
        agent: &AgentProjection,
        action: LifecycleAction,
    ) -> ActionRun {
        let mut run = ActionRun {
            session_name: agent.session_name.clone(),
            action,
            phases: vec![ExecutionPhase::Received],
            result: RunResult::Completed(ExecutionReport::default()),
        };

        if let Err(err) = agent_state::verify_requesting(&agent.state_file, action) {
            run.advance(ExecutionPhase::Failed);
            run.result = RunResult::PreconditionFailed(err);
            return run;
        }
        run.advance(ExecutionPhase::Verified);
        info!(
            agent = %agent.identity,
            key = %action.request_flag(),
            "Verified agent is requesting lifecycle action"
        );

        status::observe(self.status, &agent.status_record_id);

        run.advance(ExecutionPhase::Executing);
        match self.execute(identity, agent, action) {
            Ok(report) => {
                run.advance(ExecutionPhase::Completed);
                run.result = RunResult::Completed(report);
            }
            Err(failure) => {
                run.advance(ExecutionPhase::Failed);
                run.result = RunResult::Failed(failure);
            }
        }
        run
    }

    /// Executes an already verified action.
    pub fn execute(
        &self,
        identity: &AgentIdentity,
        agent: &AgentProjection,
        action: LifecycleAction,
    ) -> Result<ExecutionReport, ExecutionFailure> {
        let session = agent.session_name.as_str();
        info!(session = %session, action = %action, "Executing lifecycle action");

        let mut report = ExecutionReport {
            was_running: self
                .sessions
                .has_session(session)
                .map_err(ExecutionFailure::at(FailureStage::SessionCheck))?,
            ..ExecutionReport::default()
        };

        if report.was_running {
            self.sessions
                .kill_session(session)
                .map_err(ExecutionFailure::at(FailureStage::Kill))?;
            report.killed = true;
            info!(session = %session, action = %action, "Killed session");
        }

        if !action.restarts_session() {
            return Ok(report);
        }

        if report.killed {
            // Give the host time to release the name before reusing it.
            thread::sleep(self.config.settle_interval());
        }

        self.start_session(identity, agent, &mut report)?;
        info!(session = %session, "Restarted session");
        report.flag_cleared = self.clear_flag(agent, action);
        Ok(report)
    }

    /// Restart tail only: used to recover an agent whose session creation failed.
    pub fn recreate(
        &self,
        identity: &AgentIdentity,
        agent: &AgentProjection,
        action: LifecycleAction,
    ) -> Result<ExecutionReport, ExecutionFailure> {
        let mut report = ExecutionReport::default();
        self.start_session(identity, agent, &mut report)?;
        info!(session = %agent.session_name, "Recreated session");
        report.flag_cleared = self.clear_flag(agent, action);
        Ok(report)
    }

    fn start_session(
        &self,
        identity: &AgentIdentity,
        agent: &AgentProjection,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutionFailure> {
        let session = agent.session_name.as_str();

        if agent.role.needs_workspace_sync() {
            info!(
                agent = %agent.identity,
                dir = %agent.work_dir.display(),
                "Pre-syncing workspace"
            );
            report.workspace_sync = Some(sync_workspace(
                self.repository,
                self.tracker,
                &agent.work_dir,
                &self.config.upstream_remote,
                &self.config.main_branch,
            ));
        }

        self.sessions
            .new_session(session, &agent.work_dir)
            .map_err(ExecutionFailure::at(FailureStage::Create))?;
        report.created = true;

        report.environment_set = [
            (ROLE_ENV, agent.identity.as_str()),
            (ACTOR_ENV, agent.actor_path.as_str()),
        ]
        .into_iter()
        .fold(true, |all_set, (key, value)| {
            match self.sessions.set_environment(session, key, value) {
                Ok(()) => all_set,
                Err(err) => {
                    warn!(
                        session = %session,
                        key = %key,
                        error = %err,
                        "Failed to set session environment"
                    );
                    false
                }
            }
        });

        if let Some(decoration) = SessionDecoration::for_identity(identity) {
            match self.sessions.apply_theme(session, &decoration) {
                Ok(()) => report.themed = true,
                Err(err) => warn!(session = %session, error = %err, "Failed to theme session"),
            }
        }

        self.sessions
            .send_keys(session, &self.config.startup_command)
            .map_err(ExecutionFailure::at(FailureStage::StartupCommand))?;
        Ok(())
    }

    fn clear_flag(&self, agent: &AgentProjection, action: LifecycleAction) -> bool {
        match agent_state::clear_requesting(&agent.state_file, action) {
            Ok(()) => true,
            Err(err) => {
                warn!(agent = %agent.identity, error = %err, "Failed to clear agent request flag");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::status::AgentStatusInfo;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubHost {
        live: Mutex<BTreeSet<String>>,
        fail_kill: bool,
    }

    impl StubHost {
        fn running(name: &str) -> Self {
            let host = Self::default();
            host.live.lock().expect("lock").insert(name.to_string());
            host
        }
    }

    impl SessionHost for StubHost {
        fn has_session(&self, name: &str) -> Result<bool> {
            Ok(self.live.lock().expect("lock").contains(name))
        }

        fn kill_session(&self, name: &str) -> Result<()> {
            if self.fail_kill {
                return Err(WardenError::CommandFailed {
                    command: "tmux kill-session".to_string(),
                    details: "server exited".to_string(),
                });
            }
            self.live.lock().expect("lock").remove(name);
            Ok(())
        }

        fn new_session(&self, name: &str, _dir: &Path) -> Result<()> {
            self.live.lock().expect("lock").insert(name.to_string());
            Ok(())
        }

        fn set_environment(&self, _name: &str, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn apply_theme(&self, _name: &str, _decoration: &SessionDecoration) -> Result<()> {
            Ok(())
        }

        fn send_keys(&self, _name: &str, _line: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Offline;

    impl RepositorySync for Offline {
        fn fetch(&self, _dir: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        fn pull_rebase(&self, _dir: &Path, _remote: &str, _branch: &str) -> Result<()> {
            Ok(())
        }
    }

    impl TrackerSync for Offline {
        fn sync(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    impl StatusSource for Offline {
        fn fetch(&self, id: &str) -> Result<AgentStatusInfo> {
            Err(WardenError::StatusRecordNotFound(id.to_string()))
        }
    }

    struct Fixture {
        _town: TempDir,
        config: SupervisorConfig,
        identity: AgentIdentity,
        agent: AgentProjection,
    }

    fn fixture(state: Option<serde_json::Value>) -> Fixture {
        let town = tempfile::tempdir().expect("temp dir");
        let mut config = SupervisorConfig::with_town_root(town.path());
        config.settle_interval_ms = 0;
        let identity = AgentIdentity::parse("wyvern-crew-nux");
        let agent = identity
            .project(town.path(), &config.session_prefix)
            .expect("crew identity resolves");
        if let Some(state) = state {
            fs_err::create_dir_all(agent.state_file.parent().expect("parent")).expect("mkdir");
            fs_err::write(&agent.state_file, state.to_string()).expect("write state");
        }
        Fixture {
            _town: town,
            config,
            identity,
            agent,
        }
    }

    fn run_with(fixture: &Fixture, host: &StubHost, action: LifecycleAction) -> ActionRun {
        let executor = ActionExecutor {
            config: &fixture.config,
            sessions: host,
            repository: &Offline,
            tracker: &Offline,
            status: &Offline,
        };
        executor.run(&fixture.identity, &fixture.agent, action)
    }

    #[test]
    fn precondition_failure_skips_straight_to_failed() {
        let fixture = fixture(Some(json!({"requesting_cycle": false})));
        let host = StubHost::running("gt-wyvern-crew-nux");

        let run = run_with(&fixture, &host, LifecycleAction::Cycle);

        assert_eq!(
            run.phases,
            vec![ExecutionPhase::Received, ExecutionPhase::Failed]
        );
        assert_eq!(run.phase(), ExecutionPhase::Failed);
        assert!(matches!(
            &run.result,
            RunResult::PreconditionFailed(err) if err.is_precondition()
        ));
        assert!(host.live.lock().expect("lock").contains("gt-wyvern-crew-nux"));
    }

    #[test]
    fn successful_cycle_visits_every_phase() {
        let fixture = fixture(Some(json!({"requesting_cycle": true})));
        let host = StubHost::running("gt-wyvern-crew-nux");

        let run = run_with(&fixture, &host, LifecycleAction::Cycle);

        assert_eq!(
            run.phases,
            vec![
                ExecutionPhase::Received,
                ExecutionPhase::Verified,
                ExecutionPhase::Executing,
                ExecutionPhase::Completed,
            ]
        );
        let RunResult::Completed(report) = &run.result else {
            panic!("expected completion, got {:?}", run.result);
        };
        assert!(report.killed && report.created && report.flag_cleared);
        assert!(report.workspace_sync.expect("crew syncs").is_clean());
    }

    #[test]
    fn kill_failure_fails_after_executing() {
        let fixture = fixture(Some(json!({"requesting_restart": true})));
        let host = StubHost {
            fail_kill: true,
            ..StubHost::running("gt-wyvern-crew-nux")
        };

        let run = run_with(&fixture, &host, LifecycleAction::Restart);

        assert_eq!(
            run.phases,
            vec![
                ExecutionPhase::Received,
                ExecutionPhase::Verified,
                ExecutionPhase::Executing,
                ExecutionPhase::Failed,
            ]
        );
        let RunResult::Failed(failure) = &run.result else {
            panic!("expected failure, got {:?}", run.result);
        };
        assert_eq!(failure.stage, FailureStage::Kill);
        assert!(!failure.needs_recreate());
    }
}
