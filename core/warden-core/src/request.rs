//! Lifecycle request extraction and the staleness gate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use warden_protocol::{ControlMessage, LifecycleBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Restart,
    Shutdown,
    Cycle,
}

impl LifecycleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Restart => "restart",
            LifecycleAction::Shutdown => "shutdown",
            LifecycleAction::Cycle => "cycle",
        }
    }

    /// Case-insensitive mapping of an action word; `stop` is an alias for shutdown.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "restart" => Some(LifecycleAction::Restart),
            "shutdown" | "stop" => Some(LifecycleAction::Shutdown),
            "cycle" => Some(LifecycleAction::Cycle),
            _ => None,
        }
    }

    /// State key the agent sets to acknowledge readiness for this action.
    pub fn request_flag(self) -> String {
        format!("requesting_{}", self.as_str())
    }

    pub fn restarts_session(self) -> bool {
        matches!(self, LifecycleAction::Restart | LifecycleAction::Cycle)
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRequest {
    pub message_id: String,
    pub from: String,
    pub action: LifecycleAction,
    /// Timestamp the sender stamped on the message, if it parsed.
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

impl LifecycleRequest {
    /// Staleness gate. Requests without a usable timestamp are never stale, and
    /// a request exactly `max_age` old still passes.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now).is_some_and(|age| age > max_age)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.sent_at.map(|sent_at| now.signed_duration_since(sent_at))
    }
}

/// Extracts a lifecycle request, or `None` if the message is not one.
pub fn parse_lifecycle_request(
    message: &ControlMessage,
    received_at: DateTime<Utc>,
) -> Option<LifecycleRequest> {
    if !message.is_lifecycle() {
        return None;
    }

    let word = match serde_json::from_str::<LifecycleBody>(&message.body) {
        Ok(body) => body.action,
        Err(_) => match keyword_action(&message.body) {
            Some(word) => word.to_string(),
            None => {
                warn!(
                    message_id = %message.id,
                    from = %message.from,
                    body = %message.body,
                    "Lifecycle request with unparseable body"
                );
                return None;
            }
        },
    };

    let Some(action) = LifecycleAction::from_word(&word) else {
        warn!(
            message_id = %message.id,
            from = %message.from,
            action = %word,
            "Unknown lifecycle action"
        );
        return None;
    };

    Some(LifecycleRequest {
        message_id: message.id.clone(),
        from: message.from.clone(),
        action,
        sent_at: message.sent_at(),
        received_at,
    })
}

fn keyword_action(body: &str) -> Option<&'static str> {
    let normalized = body.trim().to_lowercase();
    match normalized.as_str() {
        "restart" | "action: restart" => Some("restart"),
        "shutdown" | "stop" | "action: shutdown" | "action: stop" => Some("shutdown"),
        "cycle" | "action: cycle" => Some("cycle"),
        _ => None,
    }
}
