//! Supervisor ledger persisted between heartbeats.
//!
//! Tracks two things a single heartbeat cannot remember on its own:
//!
//! - **needs_recreate**: agents whose restart killed (or found no) session
//!   but failed to create a new one. Their request flag is left set and the
//!   next heartbeat retries session creation.
//! - **claim_failures**: consecutive delete failures per message id. Past the
//!   configured bound the message is no longer executed, only escalated.
//!
//! Loading is lenient: a missing or corrupt file yields an empty ledger.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

use crate::error::{Result, WardenError};
use crate::request::LifecycleAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecreate {
    pub action: LifecycleAction,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorLedger {
    #[serde(default)]
    pub needs_recreate: BTreeMap<String, PendingRecreate>,
    #[serde(default)]
    pub claim_failures: BTreeMap<String, u32>,
}

impl SupervisorLedger {
    pub fn load(path: &Path) -> Self {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to read supervisor ledger; starting empty"
                );
                return Self::default();
            }
        };

        serde_json::from_slice(&data).unwrap_or_else(|err| {
            warn!(
                path = %path.display(),
                error = %err,
                "Failed to parse supervisor ledger; starting empty"
            );
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |context: &str, source: std::io::Error| WardenError::Io {
            context: format!("{context} {}", path.display()),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| io_err("creating ledger dir for", err))?;
        }

        let payload = serde_json::to_vec_pretty(self).map_err(|err| WardenError::Json {
            context: "serializing supervisor ledger".to_string(),
            source: err,
        })?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload).map_err(|err| io_err("writing", err))?;
        fs::rename(&tmp_path, path).map_err(|err| io_err("committing", err))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.needs_recreate.is_empty() && self.claim_failures.is_empty()
    }

    /// Bumps and returns the consecutive failure count for `message_id`.
    pub fn record_claim_failure(&mut self, message_id: &str) -> u32 {
        let count = self.claim_failures.entry(message_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn clear_claim_failure(&mut self, message_id: &str) {
        self.claim_failures.remove(message_id);
    }

    /// Drops counters for messages that have left the inbox.
    pub fn retain_claims(&mut self, inbox_ids: &HashSet<&str>) {
        self.claim_failures
            .retain(|message_id, _| inbox_ids.contains(message_id.as_str()));
    }

    pub fn record_needs_recreate(
        &mut self,
        identity: &str,
        action: LifecycleAction,
        error: &str,
        now: DateTime<Utc>,
    ) {
        let entry = self
            .needs_recreate
            .entry(identity.to_string())
            .or_insert_with(|| PendingRecreate {
                action,
                recorded_at: now,
                attempts: 0,
                last_error: String::new(),
            });
        entry.action = action;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = error.to_string();
    }

    pub fn resolve_recreate(&mut self, identity: &str) -> Option<PendingRecreate> {
        self.needs_recreate.remove(identity)
    }
}
