//! Mail transport port.
//!
//! The supervisor only lists its own inbox and deletes messages by id. Deletion
//! is the claim: a message is removed before the action it carries runs.

use std::path::PathBuf;
use tracing::debug;
use warden_protocol::{parse_inbox, ControlMessage};

use crate::command;
use crate::error::{Result, WardenError};

pub trait Mailbox: Send + Sync {
    /// Messages currently addressed to the supervisor, in inbox order.
    fn inbox(&self) -> Result<Vec<ControlMessage>>;
    /// Removes a message. Callers treat failures as warnings.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Drives `gt mail` from the town root.
#[derive(Debug, Clone)]
pub struct CommandMailbox {
    binary: String,
    identity: String,
    town_root: PathBuf,
}

impl CommandMailbox {
    pub fn new(
        binary: impl Into<String>,
        identity: impl Into<String>,
        town_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            identity: identity.into(),
            town_root: town_root.into(),
        }
    }
}

impl Mailbox for CommandMailbox {
    fn inbox(&self) -> Result<Vec<ControlMessage>> {
        let output = command::run(
            &self.binary,
            &["mail", "inbox", "--identity", &self.identity, "--json"],
            Some(&self.town_root),
        )?;
        parse_inbox(&output).map_err(|err| WardenError::Json {
            context: format!("parsing inbox for {}", self.identity),
            source: err,
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        command::run(&self.binary, &["mail", "delete", id], Some(&self.town_root))?;
        debug!(message_id = %id, "Deleted lifecycle message");
        Ok(())
    }
}
