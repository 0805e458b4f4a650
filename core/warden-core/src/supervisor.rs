//! Heartbeat-driven lifecycle supervisor.
//!
//! One heartbeat is a full, strictly sequential pass:
//!
//! 1. retry agents left without a session by a failed restart
//! 2. list the inbox
//! 3. per message: filter → staleness → claim (delete) → resolve → verify →
//!    execute
//!
//! Nothing that goes wrong with one message stops the pass. Every message
//! produces a [`MessageOutcome`], collected into a [`HeartbeatReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use warden_protocol::ControlMessage;

use crate::agent_state;
use crate::config::SupervisorConfig;
use crate::error::WardenError;
use crate::executor::{ActionExecutor, ExecutionReport, RunResult};
use crate::identity::AgentIdentity;
use crate::ledger::SupervisorLedger;
use crate::mailbox::{CommandMailbox, Mailbox};
use crate::request::{parse_lifecycle_request, LifecycleAction};
use crate::session::{SessionHost, TmuxSessionHost};
use crate::status::{CommandStatusSource, StatusSource};
use crate::sync::{CommandTrackerSync, GitRepositorySync, RepositorySync, TrackerSync};

/// External collaborators the supervisor drives.
pub struct SupervisorPorts {
    pub mailbox: Box<dyn Mailbox>,
    pub sessions: Box<dyn SessionHost>,
    pub repository: Box<dyn RepositorySync>,
    pub tracker: Box<dyn TrackerSync>,
    pub status: Box<dyn StatusSource>,
}

impl SupervisorPorts {
    /// Command-line backed ports: `gt mail`, `tmux`, `git`, `bd`.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            mailbox: Box::new(CommandMailbox::new(
                config.mail_binary.clone(),
                config.inbox_identity.clone(),
                config.town_root.clone(),
            )),
            sessions: Box::new(TmuxSessionHost::new(config.tmux_binary.clone())),
            repository: Box::new(GitRepositorySync::new(config.git_binary.clone())),
            tracker: Box::new(CommandTrackerSync::new(config.tracker_binary.clone())),
            status: Box::new(CommandStatusSource::new(
                config.tracker_binary.clone(),
                config.town_root.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// Not a lifecycle request; left in the inbox.
    Ignored,
    /// Older than the staleness threshold; deleted without executing.
    Stale,
    /// Deletion kept failing; no longer executed.
    ClaimEscalated { failures: u32 },
    Unresolved,
    PreconditionFailed { reason: String },
    Completed { report: ExecutionReport },
    Failed { reason: String },
    /// Old session gone, new one not created; retried next heartbeat.
    NeedsRecreate { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageOutcome {
    pub message_id: String,
    pub from: String,
    pub action: Option<LifecycleAction>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryDisposition {
    Recreated { report: ExecutionReport },
    /// Someone else already brought a session back.
    SessionPresent,
    /// The agent no longer asks for the action.
    Withdrawn,
    Unresolved,
    StillFailing { attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    pub identity: String,
    pub action: LifecycleAction,
    pub disposition: RecoveryDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxFailureKind {
    /// The mail tool is missing or exited non-zero.
    Unavailable,
    /// The mail tool answered with output that is not an inbox.
    Undecodable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxFailure {
    pub kind: InboxFailureKind,
    pub reason: String,
}

impl InboxFailure {
    fn from_error(err: &WardenError) -> Self {
        let kind = match err {
            WardenError::Json { .. } => InboxFailureKind::Undecodable,
            _ => InboxFailureKind::Unavailable,
        };
        Self {
            kind,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatReport {
    pub recoveries: Vec<RecoveryOutcome>,
    pub messages: Vec<MessageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_error: Option<InboxFailure>,
}

impl HeartbeatReport {
    pub fn executed(&self) -> usize {
        self.messages
            .iter()
            .filter(|outcome| matches!(outcome.disposition, Disposition::Completed { .. }))
            .count()
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    ports: SupervisorPorts,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, ports: SupervisorPorts) -> Self {
        Self { config, ports }
    }

    pub fn from_config(config: SupervisorConfig) -> Self {
        let ports = SupervisorPorts::from_config(&config);
        Self::new(config, ports)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn heartbeat(&self) -> HeartbeatReport {
        self.heartbeat_at(Utc::now())
    }

    pub fn heartbeat_at(&self, now: DateTime<Utc>) -> HeartbeatReport {
        let ledger_path = self.config.ledger_path();
        let loaded = SupervisorLedger::load(&ledger_path);
        let mut ledger = loaded.clone();
        let mut report = HeartbeatReport {
            recoveries: self.retry_pending(&mut ledger),
            ..HeartbeatReport::default()
        };

        match self.ports.mailbox.inbox() {
            Ok(messages) => {
                for message in &messages {
                    let outcome = self.process_message(message, now, &mut ledger);
                    report.messages.push(outcome);
                }
                let inbox_ids: HashSet<&str> =
                    messages.iter().map(|message| message.id.as_str()).collect();
                ledger.retain_claims(&inbox_ids);
            }
            Err(err) => {
                let failure = InboxFailure::from_error(&err);
                match failure.kind {
                    // The mail tool may be absent or the inbox unreachable; try again next beat.
                    InboxFailureKind::Unavailable => {
                        debug!(error = %err, "Failed to read supervisor inbox")
                    }
                    InboxFailureKind::Undecodable => {
                        error!(error = %err, "Error parsing supervisor inbox")
                    }
                }
                report.inbox_error = Some(failure);
            }
        }

        if ledger != loaded {
            if let Err(err) = ledger.save(&ledger_path) {
                warn!(error = %err, "Failed to persist supervisor ledger");
            }
        }

        report
    }

    fn executor(&self) -> ActionExecutor<'_> {
        ActionExecutor {
            config: &self.config,
            sessions: self.ports.sessions.as_ref(),
            repository: self.ports.repository.as_ref(),
            tracker: self.ports.tracker.as_ref(),
            status: self.ports.status.as_ref(),
        }
    }

    fn process_message(
        &self,
        message: &ControlMessage,
        now: DateTime<Utc>,
        ledger: &mut SupervisorLedger,
    ) -> MessageOutcome {
        let mut outcome = MessageOutcome {
            message_id: message.id.clone(),
            from: message.from.clone(),
            action: None,
            disposition: Disposition::Ignored,
        };

        let Some(request) = parse_lifecycle_request(message, now) else {
            return outcome;
        };
        outcome.action = Some(request.action);

        let max_age = self.config.max_message_age();
        if request.is_stale(now, max_age) {
            info!(
                from = %request.from,
                message_id = %request.message_id,
                age_minutes = request.age(now).map(|age| age.num_minutes()).unwrap_or_default(),
                max_age_minutes = max_age.num_minutes(),
                "Ignoring stale lifecycle request; deleting"
            );
            if let Err(err) = self.ports.mailbox.delete(&request.message_id) {
                warn!(
                    message_id = %request.message_id,
                    error = %err,
                    "Failed to delete stale message"
                );
            }
            outcome.disposition = Disposition::Stale;
            return outcome;
        }

        info!(from = %request.from, action = %request.action, "Processing lifecycle request");

        // Claim before executing: once deleted, a later heartbeat cannot run it again.
        match self.ports.mailbox.delete(&request.message_id) {
            Ok(()) => ledger.clear_claim_failure(&request.message_id),
            Err(err) => {
                let failures = ledger.record_claim_failure(&request.message_id);
                if failures > self.config.max_claim_failures {
                    error!(
                        message_id = %request.message_id,
                        from = %request.from,
                        failures,
                        error = %err,
                        "Lifecycle message cannot be claimed; refusing to execute it again"
                    );
                    outcome.disposition = Disposition::ClaimEscalated { failures };
                    return outcome;
                }
                warn!(
                    message_id = %request.message_id,
                    failures,
                    error = %err,
                    "Failed to delete message before execution; executing anyway"
                );
            }
        }

        let identity = AgentIdentity::parse(&request.from);
        let Some(agent) = identity.project(&self.config.town_root, &self.config.session_prefix)
        else {
            error!(from = %request.from, "Unknown agent identity; dropping lifecycle request");
            outcome.disposition = Disposition::Unresolved;
            return outcome;
        };

        let run = self.executor().run(&identity, &agent, request.action);
        outcome.disposition = match run.result {
            RunResult::Completed(report) => Disposition::Completed { report },
            RunResult::PreconditionFailed(err) => {
                error!(
                    agent = %agent.identity,
                    action = %request.action,
                    error = %err,
                    "State verification failed"
                );
                Disposition::PreconditionFailed {
                    reason: err.to_string(),
                }
            }
            RunResult::Failed(failure) => {
                error!(
                    agent = %agent.identity,
                    action = %request.action,
                    error = %failure,
                    "Error executing lifecycle action"
                );
                if failure.needs_recreate() {
                    ledger.record_needs_recreate(
                        &agent.identity,
                        request.action,
                        &failure.to_string(),
                        now,
                    );
                    Disposition::NeedsRecreate {
                        reason: failure.to_string(),
                    }
                } else {
                    Disposition::Failed {
                        reason: failure.to_string(),
                    }
                }
            }
        };
        outcome
    }

    fn retry_pending(&self, ledger: &mut SupervisorLedger) -> Vec<RecoveryOutcome> {
        let pending: Vec<_> = ledger
            .needs_recreate
            .iter()
            .map(|(identity, entry)| (identity.clone(), entry.action))
            .collect();

        pending
            .into_iter()
            .map(|(raw, action)| {
                let disposition = self.retry_one(&raw, action, ledger);
                RecoveryOutcome {
                    identity: raw,
                    action,
                    disposition,
                }
            })
            .collect()
    }

    fn retry_one(
        &self,
        raw: &str,
        action: LifecycleAction,
        ledger: &mut SupervisorLedger,
    ) -> RecoveryDisposition {
        let identity = AgentIdentity::parse(raw);
        let Some(agent) = identity.project(&self.config.town_root, &self.config.session_prefix)
        else {
            ledger.resolve_recreate(raw);
            return RecoveryDisposition::Unresolved;
        };

        match self.ports.sessions.has_session(&agent.session_name) {
            Ok(true) => {
                info!(
                    session = %agent.session_name,
                    "Session already present; recovery no longer needed"
                );
                ledger.resolve_recreate(raw);
                return RecoveryDisposition::SessionPresent;
            }
            Ok(false) => {}
            Err(err) => return still_failing(ledger, raw, action, err.to_string()),
        }

        if !agent_state::is_requesting(&agent.state_file, action) {
            info!(
                agent = %raw,
                action = %action,
                "Agent withdrew lifecycle request; recovery dropped"
            );
            ledger.resolve_recreate(raw);
            return RecoveryDisposition::Withdrawn;
        }

        match self.executor().recreate(&identity, &agent, action) {
            Ok(report) => {
                ledger.resolve_recreate(raw);
                RecoveryDisposition::Recreated { report }
            }
            Err(failure) => still_failing(ledger, raw, action, failure.to_string()),
        }
    }
}

fn still_failing(
    ledger: &mut SupervisorLedger,
    raw: &str,
    action: LifecycleAction,
    reason: String,
) -> RecoveryDisposition {
    let recorded_at = ledger
        .needs_recreate
        .get(raw)
        .map(|entry| entry.recorded_at)
        .unwrap_or_else(Utc::now);
    ledger.record_needs_recreate(raw, action, &reason, recorded_at);
    let attempts = ledger
        .needs_recreate
        .get(raw)
        .map(|entry| entry.attempts)
        .unwrap_or_default();
    error!(agent = %raw, attempts, error = %reason, "Session recovery still failing");
    RecoveryDisposition::StillFailing { attempts, reason }
}
