//! Wire types shared by the lifecycle supervisor and the tools that feed it.
//!
//! The mail transport and the issue tracker both speak JSON on stdout. This
//! crate pins down the subset of their schemas the supervisor consumes, so the
//! daemon and any test harness decode exactly the same shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject prefix (compared case-insensitively) that marks a lifecycle request.
pub const LIFECYCLE_SUBJECT_PREFIX: &str = "lifecycle:";

/// A message as listed by `gt mail inbox --json`.
///
/// Every field defaults so that partially populated records from older
/// transports still decode; the supervisor decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub priority: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl ControlMessage {
    /// True when the subject carries the lifecycle sentinel prefix.
    pub fn is_lifecycle(&self) -> bool {
        self.subject
            .to_lowercase()
            .starts_with(LIFECYCLE_SUBJECT_PREFIX)
    }

    /// Parses `timestamp` as RFC3339. `None` when absent or malformed.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.timestamp.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Structured lifecycle body: `{"action": "cycle"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleBody {
    #[serde(default)]
    pub action: String,
}

/// One row of `bd show <id> --json` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecordRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Decodes inbox output. Blank output means an empty inbox.
pub fn parse_inbox(output: &[u8]) -> Result<Vec<ControlMessage>, serde_json::Error> {
    if is_blank(output) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(output)
}

/// Decodes status lookup output. Blank output means no rows.
pub fn parse_status_rows(output: &[u8]) -> Result<Vec<StatusRecordRow>, serde_json::Error> {
    if is_blank(output) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(output)
}

fn is_blank(output: &[u8]) -> bool {
    output.iter().all(|byte| byte.is_ascii_whitespace())
}
