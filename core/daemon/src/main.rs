//! warden-daemon: lifecycle request supervisor for agent sessions.
//!
//! ## Subcommands
//!
//! - `run`: heartbeat loop, one full inbox pass per interval
//! - `heartbeat`: a single pass; prints the report as JSON
//! - `resolve`: show everything derived from an agent identity
//! - `status`: look up an agent's status record in the tracker

mod logging;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, error, info, warn};

use warden_core::{
    load_config, resolve_town_root, AgentIdentity, CommandStatusSource, HeartbeatReport,
    StatusSource, Supervisor, SupervisorConfig, WardenError,
};

#[derive(Parser)]
#[command(name = "warden-daemon")]
#[command(about = "Processes lifecycle requests from the supervisor inbox")]
#[command(version)]
struct Cli {
    /// Town root (defaults to $GT_TOWN_ROOT, then ~/gt)
    #[arg(long, global = true, value_name = "DIR")]
    town_root: Option<PathBuf>,

    /// Config file (defaults to <town>/daemon/lifecycle.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run heartbeats until killed
    Run,

    /// Run one heartbeat and print its report
    Heartbeat,

    /// Print the session, state file, and paths for an identity
    Resolve {
        /// Agent identity, e.g. "wyvern-crew-nux"
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },

    /// Print the tracker's status record for an identity
    Status {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let loaded = resolve_town_root(cli.town_root.clone())
        .and_then(|town_root| load_config(cli.config.clone(), &town_root));

    let log_dir = loaded
        .as_ref()
        .ok()
        .and_then(SupervisorConfig::resolved_log_dir);
    let _logging_guard = logging::init(log_dir.as_deref());

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load supervisor config");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => {
            run_loop(Supervisor::from_config(config));
            Ok(())
        }
        Commands::Heartbeat => {
            let report = Supervisor::from_config(config).heartbeat();
            log_report(&report);
            print_json(&report)
        }
        Commands::Resolve { identity } => resolve(&config, &identity),
        Commands::Status { identity } => status(&config, &identity),
    };

    if let Err(err) = result {
        error!(error = %err, "warden-daemon failed");
        std::process::exit(1);
    }
}

fn run_loop(supervisor: Supervisor) {
    let config = supervisor.config();
    info!(
        town_root = %config.town_root.display(),
        inbox = %config.inbox_identity,
        interval_secs = config.heartbeat_interval_secs,
        "Lifecycle supervisor started"
    );

    loop {
        let report = supervisor.heartbeat();
        log_report(&report);
        thread::sleep(supervisor.config().heartbeat_interval());
    }
}

fn log_report(report: &HeartbeatReport) {
    match summarize(report) {
        Summary::Idle => debug!("Heartbeat: nothing to do"),
        Summary::InboxUnreadable(reason) => {
            warn!(inbox_error = %reason, "Heartbeat finished without reading the inbox")
        }
        Summary::Worked => info!(
            messages = report.messages.len(),
            executed = report.executed(),
            recoveries = report.recoveries.len(),
            inbox_error = report
                .inbox_error
                .as_ref()
                .map(|failure| failure.reason.as_str())
                .unwrap_or(""),
            "Heartbeat finished"
        ),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Summary<'a> {
    Idle,
    InboxUnreadable(&'a str),
    Worked,
}

fn summarize(report: &HeartbeatReport) -> Summary<'_> {
    if !report.messages.is_empty() || !report.recoveries.is_empty() {
        return Summary::Worked;
    }
    match &report.inbox_error {
        Some(failure) => Summary::InboxUnreadable(&failure.reason),
        None => Summary::Idle,
    }
}

fn resolve(config: &SupervisorConfig, raw: &str) -> Result<(), WardenError> {
    let projection = AgentIdentity::parse(raw)
        .project(&config.town_root, &config.session_prefix)
        .ok_or_else(|| WardenError::UnresolvedIdentity(raw.to_string()))?;
    print_json(&projection)
}

fn status(config: &SupervisorConfig, raw: &str) -> Result<(), WardenError> {
    let id = AgentIdentity::parse(raw)
        .status_record_id()
        .ok_or_else(|| WardenError::UnresolvedIdentity(raw.to_string()))?;
    let source = CommandStatusSource::new(config.tracker_binary.clone(), config.town_root.clone());
    match source.fetch(&id) {
        Ok(info) => print_json(&info),
        Err(err) => {
            warn!(id = %id, error = %err, "Status record unavailable");
            print_json(&serde_json::Value::Null)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), WardenError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| WardenError::Json {
        context: "rendering output".to_string(),
        source: err,
    })?;
    println!("{rendered}");
    Ok(())
}
