//! # warden-core
//!
//! Lifecycle request supervisor for agent sessions.
//!
//! Agents ask to be restarted, cycled, or shut down by mailing the supervisor
//! inbox. On each heartbeat the [`Supervisor`] claims those messages, checks
//! that the agent has really marked itself ready in its own state file, and
//! only then touches its session.
//!
//! ## Design Principles
//!
//! - **Synchronous**: one message at a time, blocking calls, no async runtime.
//! - **Claim then execute**: a message is deleted before its action runs, so
//!   a request executes at most once even when heartbeats overlap retries.
//! - **Fail closed**: no `requesting_<action> = true`, no kill.
//! - **Ports, not processes**: mail, sessions, git, and the tracker sit behind
//!   traits; the command-backed implementations are the defaults.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use warden_core::{load_config, resolve_town_root, Supervisor};
//!
//! let town_root = resolve_town_root(None)?;
//! let supervisor = Supervisor::from_config(load_config(None, &town_root)?);
//! let report = supervisor.heartbeat();
//! ```

pub mod agent_state;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod identity;
pub mod ledger;
pub mod mailbox;
pub mod request;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod sync;
pub mod theme;

pub use config::{load_config, resolve_town_root, SupervisorConfig};
pub use error::{Result, WardenError};
pub use executor::{ActionExecutor, ActionRun, ExecutionPhase, ExecutionReport, RunResult};
pub use identity::{AgentIdentity, AgentProjection, AgentRole};
pub use ledger::SupervisorLedger;
pub use mailbox::{CommandMailbox, Mailbox};
pub use request::{parse_lifecycle_request, LifecycleAction, LifecycleRequest};
pub use session::{SessionHost, TmuxSessionHost};
pub use status::{AgentStatusInfo, CommandStatusSource, StatusSource};
pub use supervisor::{
    Disposition, HeartbeatReport, InboxFailure, InboxFailureKind, MessageOutcome,
    RecoveryDisposition, RecoveryOutcome, Supervisor, SupervisorPorts,
};
pub use sync::{CommandTrackerSync, GitRepositorySync, RepositorySync, TrackerSync};
pub use theme::SessionDecoration;
pub use warden_protocol::ControlMessage;
