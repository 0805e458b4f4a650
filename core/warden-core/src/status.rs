//! Agent status records from the issue tracker.
//!
//! Agents publish a self-reported run state (idle/running/stuck/stopped) in
//! their tracker record. The supervisor trusts the agent's state file for
//! gating; this reader only feeds diagnostics and never blocks an action.
//!
//! The record description is a loose `key: value` list:
//!
//! ```text
//! agent_state: running
//! hook_bead: gt-123
//! role_type: refinery
//! rig: wyvern
//! ```

use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use warden_protocol::{parse_status_rows, StatusRecordRow};

use crate::command;
use crate::error::{Result, WardenError};

const AGENT_RECORD_TYPE: &str = "agent";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentStatusInfo {
    pub id: String,
    pub kind: String,
    pub state: Option<String>,
    pub hook_bead: Option<String>,
    pub role_bead: Option<String>,
    pub role_type: Option<String>,
    pub rig: Option<String>,
    pub last_update: String,
}

impl AgentStatusInfo {
    pub fn from_row(row: StatusRecordRow) -> Result<Self> {
        if row.issue_type != AGENT_RECORD_TYPE {
            return Err(WardenError::NotAgentRecord {
                id: row.id,
                kind: row.issue_type,
            });
        }

        let mut info = AgentStatusInfo {
            id: row.id,
            kind: row.issue_type,
            last_update: row.updated_at,
            ..AgentStatusInfo::default()
        };

        for (key, value) in description_fields(&row.description) {
            let slot = match key.as_str() {
                "agent_state" => &mut info.state,
                "hook_bead" => &mut info.hook_bead,
                "role_bead" => &mut info.role_bead,
                "role_type" => &mut info.role_type,
                "rig" => &mut info.rig,
                _ => continue,
            };
            *slot = Some(value);
        }

        Ok(info)
    }

    /// `running` and `working` both count as a live agent.
    pub fn is_running(&self) -> bool {
        matches!(self.state.as_deref(), Some("running" | "working"))
    }
}

/// Yields `(lowercased key, value)` pairs, skipping blank and `null` values.
fn description_fields(description: &str) -> impl Iterator<Item = (String, String)> + '_ {
    description.lines().filter_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        let value = value.trim();
        if value.is_empty() || value == "null" {
            return None;
        }
        Some((key.trim().to_lowercase(), value.to_string()))
    })
}

pub trait StatusSource: Send + Sync {
    fn fetch(&self, id: &str) -> Result<AgentStatusInfo>;
}

/// Runs `bd show <id> --json` from the town root.
#[derive(Debug, Clone)]
pub struct CommandStatusSource {
    binary: String,
    town_root: PathBuf,
}

impl CommandStatusSource {
    pub fn new(binary: impl Into<String>, town_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            town_root: town_root.into(),
        }
    }
}

impl StatusSource for CommandStatusSource {
    fn fetch(&self, id: &str) -> Result<AgentStatusInfo> {
        let output = command::run(&self.binary, &["show", id, "--json"], Some(&self.town_root))?;
        let rows = parse_status_rows(&output).map_err(|err| WardenError::Json {
            context: format!("parsing status record {id}"),
            source: err,
        })?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| WardenError::StatusRecordNotFound(id.to_string()))?;
        AgentStatusInfo::from_row(row)
    }
}

/// Best-effort lookup for logs. Failures are swallowed.
pub fn observe(source: &dyn StatusSource, id: &str) -> Option<AgentStatusInfo> {
    match source.fetch(id) {
        Ok(info) => {
            info!(
                status_id = %id,
                agent_state = info.state.as_deref().unwrap_or("unknown"),
                running = info.is_running(),
                "Agent status record"
            );
            Some(info)
        }
        Err(err) => {
            debug!(status_id = %id, error = %err, "Agent status record unavailable");
            None
        }
    }
}
