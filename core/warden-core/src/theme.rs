//! Status-bar theming for agent sessions.
//!
//! Purely cosmetic. Each rig gets a stable colour pair derived from its name
//! so that all of a rig's sessions look alike; the mayor has its own theme.

use crate::identity::{AgentIdentity, AgentRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTheme {
    pub name: &'static str,
    pub bg: &'static str,
    pub fg: &'static str,
}

const MAYOR_THEME: SessionTheme = SessionTheme {
    name: "mayor",
    bg: "colour136",
    fg: "colour232",
};

const fn theme(name: &'static str, bg: &'static str, fg: &'static str) -> SessionTheme {
    SessionTheme { name, bg, fg }
}

const RIG_PALETTE: [SessionTheme; 8] = [
    theme("ocean", "colour24", "colour255"),
    theme("forest", "colour22", "colour255"),
    theme("rust", "colour130", "colour255"),
    theme("plum", "colour54", "colour255"),
    theme("slate", "colour238", "colour255"),
    theme("teal", "colour30", "colour255"),
    theme("wine", "colour88", "colour255"),
    theme("olive", "colour58", "colour255"),
];

pub fn mayor_theme() -> SessionTheme {
    MAYOR_THEME
}

/// Deterministic palette pick; the same rig name always maps to the same theme.
pub fn assign_theme(rig: &str) -> SessionTheme {
    let hash = rig
        .bytes()
        .fold(2_166_136_261_u32, |acc, byte| {
            (acc ^ u32::from(byte)).wrapping_mul(16_777_619)
        });
    RIG_PALETTE[hash as usize % RIG_PALETTE.len()]
}

/// Everything a session host needs to dress a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDecoration {
    pub theme: SessionTheme,
    pub rig: Option<String>,
    pub worker: String,
    pub role: String,
}

impl SessionDecoration {
    pub fn for_identity(identity: &AgentIdentity) -> Option<Self> {
        let role = identity.role()?;
        let decoration = match (role, identity.rig()) {
            (AgentRole::Coordinator, _) => SessionDecoration {
                theme: mayor_theme(),
                rig: None,
                worker: "Mayor".to_string(),
                role: role.to_string(),
            },
            (_, Some(rig)) => SessionDecoration {
                theme: assign_theme(rig),
                rig: Some(rig.to_string()),
                worker: role.to_string(),
                role: role.to_string(),
            },
            (_, None) => return None,
        };
        Some(decoration)
    }

    /// Text shown on the left of the status bar, e.g. ` wyvern/refinery `.
    pub fn status_label(&self) -> String {
        match &self.rig {
            Some(rig) => format!(" {rig}/{} ", self.worker),
            None => format!(" {} ", self.worker),
        }
    }

    pub fn status_style(&self) -> String {
        format!("bg={},fg={}", self.theme.bg, self.theme.fg)
    }
}
