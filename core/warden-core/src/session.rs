//! Session host port and its tmux implementation.
//!
//! Calls are synchronous and never retried here; retry policy belongs to the
//! caller. `kill_session` is idempotent: killing an absent session succeeds.

use std::path::Path;
use tracing::debug;

use crate::command;
use crate::error::Result;
use crate::theme::SessionDecoration;

pub trait SessionHost: Send + Sync {
    fn has_session(&self, name: &str) -> Result<bool>;
    fn kill_session(&self, name: &str) -> Result<()>;
    fn new_session(&self, name: &str, dir: &Path) -> Result<()>;
    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()>;
    fn apply_theme(&self, name: &str, decoration: &SessionDecoration) -> Result<()>;
    fn send_keys(&self, name: &str, line: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TmuxSessionHost {
    binary: String,
}

impl Default for TmuxSessionHost {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxSessionHost {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn tmux(&self, args: &[&str]) -> Result<Vec<u8>> {
        command::run(&self.binary, args, None)
    }
}

impl SessionHost for TmuxSessionHost {
    fn has_session(&self, name: &str) -> Result<bool> {
        // `=` forces an exact match; tmux otherwise accepts name prefixes.
        command::succeeds(&self.binary, &["has-session", "-t", &exact(name)], None)
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        if !self.has_session(name)? {
            debug!(session = %name, "Session already absent; nothing to kill");
            return Ok(());
        }
        match self.tmux(&["kill-session", "-t", &exact(name)]) {
            Ok(_) => Ok(()),
            // Lost a race with the session exiting on its own.
            Err(_) if !self.has_session(name)? => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn new_session(&self, name: &str, dir: &Path) -> Result<()> {
        let dir = dir.to_string_lossy();
        self.tmux(&["new-session", "-d", "-s", name, "-c", &dir])
            .map(|_| ())
    }

    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.tmux(&["set-environment", "-t", name, key, value])
            .map(|_| ())
    }

    fn apply_theme(&self, name: &str, decoration: &SessionDecoration) -> Result<()> {
        for (option, value) in theme_options(decoration) {
            self.tmux(&["set-option", "-t", name, option, &value])?;
        }
        Ok(())
    }

    fn send_keys(&self, name: &str, line: &str) -> Result<()> {
        self.tmux(&["send-keys", "-t", name, line, "Enter"])
            .map(|_| ())
    }
}

fn exact(name: &str) -> String {
    format!("={name}")
}

fn theme_options(decoration: &SessionDecoration) -> Vec<(&'static str, String)> {
    let label = decoration.status_label();
    vec![
        ("status-style", decoration.status_style()),
        ("status-left-length", (label.len() + 2).to_string()),
        ("status-left", label),
        ("status-right", format!(" {} ", decoration.role)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AgentIdentity;

    #[test]
    fn theme_options_cover_style_and_labels() {
        let identity = AgentIdentity::parse("wyvern-refinery");
        let decoration = SessionDecoration::for_identity(&identity).expect("deco");
        let options = theme_options(&decoration);
        let names: Vec<_> = options.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["status-style", "status-left-length", "status-left", "status-right"]
        );
        assert_eq!(options[2].1, " wyvern/refinery ");
        assert_eq!(options[3].1, " refinery ");
    }

    #[test]
    fn missing_tmux_binary_surfaces_as_error() {
        let host = TmuxSessionHost::new("definitely-not-tmux-xyz");
        assert!(host.has_session("gt-mayor").is_err());
        assert!(host.kill_session("gt-mayor").is_err());
    }
}
