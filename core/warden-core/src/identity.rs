//! Agent identity grammar.
//!
//! Identities are opaque strings on the wire. They are parsed exactly once
//! into [`AgentIdentity`]; everything downstream matches on the variant.
//!
//! ```text
//! mayor                  → Mayor
//! <rig>-witness          → Witness { rig }
//! <rig>-refinery         → Refinery { rig }
//! <rig>-crew-<member>    → Crew { rig, member }   (split on first "-crew-")
//! anything else          → Unresolved
//! ```
//!
//! Shapes are tried in that order, so `a-crew-b-witness` is a witness whose
//! rig is `a-crew-b`. Empty rig or member components never resolve.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

const MAYOR: &str = "mayor";
const WITNESS_SUFFIX: &str = "-witness";
const REFINERY_SUFFIX: &str = "-refinery";
const CREW_INFIX: &str = "-crew-";
const STATE_FILE_NAME: &str = "state.json";
const STATUS_ID_PREFIX: &str = "gt-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentIdentity {
    Mayor,
    Witness { rig: String },
    Refinery { rig: String },
    Crew { rig: String, member: String },
    Unresolved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coordinator,
    Witness,
    Refinery,
    Crew,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Witness => "witness",
            AgentRole::Refinery => "refinery",
            AgentRole::Crew => "crew",
        }
    }

    /// Roles that work out of a persistent clone and get synced before restart.
    pub fn needs_workspace_sync(self) -> bool {
        matches!(self, AgentRole::Refinery | AgentRole::Crew)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentIdentity {
    pub fn parse(raw: &str) -> Self {
        if raw == MAYOR {
            return AgentIdentity::Mayor;
        }
        if let Some(rig) = raw.strip_suffix(WITNESS_SUFFIX) {
            return non_empty(rig)
                .map(|rig| AgentIdentity::Witness { rig })
                .unwrap_or_else(|| AgentIdentity::Unresolved(raw.to_string()));
        }
        if let Some(rig) = raw.strip_suffix(REFINERY_SUFFIX) {
            return non_empty(rig)
                .map(|rig| AgentIdentity::Refinery { rig })
                .unwrap_or_else(|| AgentIdentity::Unresolved(raw.to_string()));
        }
        if let Some((rig, member)) = raw.split_once(CREW_INFIX) {
            return match (non_empty(rig), non_empty(member)) {
                (Some(rig), Some(member)) => AgentIdentity::Crew { rig, member },
                _ => AgentIdentity::Unresolved(raw.to_string()),
            };
        }
        AgentIdentity::Unresolved(raw.to_string())
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, AgentIdentity::Unresolved(_))
    }

    pub fn role(&self) -> Option<AgentRole> {
        match self {
            AgentIdentity::Mayor => Some(AgentRole::Coordinator),
            AgentIdentity::Witness { .. } => Some(AgentRole::Witness),
            AgentIdentity::Refinery { .. } => Some(AgentRole::Refinery),
            AgentIdentity::Crew { .. } => Some(AgentRole::Crew),
            AgentIdentity::Unresolved(_) => None,
        }
    }

    pub fn rig(&self) -> Option<&str> {
        match self {
            AgentIdentity::Witness { rig }
            | AgentIdentity::Refinery { rig }
            | AgentIdentity::Crew { rig, .. } => Some(rig),
            AgentIdentity::Mayor | AgentIdentity::Unresolved(_) => None,
        }
    }

    pub fn session_name(&self, prefix: &str) -> Option<String> {
        self.is_resolved().then(|| format!("{prefix}{self}"))
    }

    pub fn state_file(&self, town_root: &Path) -> Option<PathBuf> {
        let dir = match self {
            AgentIdentity::Mayor => town_root.join(MAYOR),
            AgentIdentity::Witness { rig } => town_root.join(rig).join("witness"),
            AgentIdentity::Refinery { rig } => town_root.join(rig).join("refinery"),
            AgentIdentity::Crew { rig, member } => town_root.join(rig).join("crew").join(member),
            AgentIdentity::Unresolved(_) => return None,
        };
        Some(dir.join(STATE_FILE_NAME))
    }

    /// Id of the agent's record in the issue tracker.
    pub fn status_record_id(&self) -> Option<String> {
        match self {
            AgentIdentity::Mayor => Some(format!("{STATUS_ID_PREFIX}{MAYOR}")),
            AgentIdentity::Witness { rig } => Some(format!("{STATUS_ID_PREFIX}witness-{rig}")),
            AgentIdentity::Refinery { rig } => Some(format!("{STATUS_ID_PREFIX}refinery-{rig}")),
            AgentIdentity::Crew { rig, member } => {
                Some(format!("{STATUS_ID_PREFIX}crew-{rig}-{member}"))
            }
            AgentIdentity::Unresolved(_) => None,
        }
    }

    /// Slash-separated actor path exported to the session as `BD_ACTOR`.
    pub fn actor_path(&self) -> Option<String> {
        match self {
            AgentIdentity::Mayor => Some(MAYOR.to_string()),
            AgentIdentity::Witness { rig } => Some(format!("{rig}/witness")),
            AgentIdentity::Refinery { rig } => Some(format!("{rig}/refinery")),
            AgentIdentity::Crew { rig, member } => Some(format!("{rig}/crew/{member}")),
            AgentIdentity::Unresolved(_) => None,
        }
    }

    /// Directory a freshly created session starts in.
    pub fn work_dir(&self, town_root: &Path) -> Option<PathBuf> {
        match self {
            AgentIdentity::Mayor => Some(town_root.to_path_buf()),
            AgentIdentity::Witness { rig } => Some(town_root.join(rig)),
            AgentIdentity::Refinery { rig } => {
                Some(town_root.join(rig).join("refinery").join("rig"))
            }
            AgentIdentity::Crew { rig, member } => {
                Some(town_root.join(rig).join("crew").join(member))
            }
            AgentIdentity::Unresolved(_) => None,
        }
    }

    /// Computes every projection at once. `None` for unresolved identities.
    pub fn project(&self, town_root: &Path, session_prefix: &str) -> Option<AgentProjection> {
        Some(AgentProjection {
            identity: self.to_string(),
            role: self.role()?,
            rig: self.rig().map(str::to_string),
            session_name: self.session_name(session_prefix)?,
            state_file: self.state_file(town_root)?,
            status_record_id: self.status_record_id()?,
            actor_path: self.actor_path()?,
            work_dir: self.work_dir(town_root)?,
        })
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentIdentity::Mayor => f.write_str(MAYOR),
            AgentIdentity::Witness { rig } => write!(f, "{rig}{WITNESS_SUFFIX}"),
            AgentIdentity::Refinery { rig } => write!(f, "{rig}{REFINERY_SUFFIX}"),
            AgentIdentity::Crew { rig, member } => write!(f, "{rig}{CREW_INFIX}{member}"),
            AgentIdentity::Unresolved(raw) => f.write_str(raw),
        }
    }
}

/// All addresses derived from one resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProjection {
    pub identity: String,
    pub role: AgentRole,
    pub rig: Option<String>,
    pub session_name: String,
    pub state_file: PathBuf,
    pub status_record_id: String,
    pub actor_path: String,
    pub work_dir: PathBuf,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
