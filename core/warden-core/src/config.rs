//! Supervisor runtime configuration.
//!
//! Settings live in `<town>/daemon/lifecycle.toml`. Every key is optional; a
//! missing file yields the defaults below. The town root itself is never read
//! from the file: it comes from the command line, `GT_TOWN_ROOT`, or `~/gt`,
//! in that order, so a config file can be shared between towns.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WardenError};

pub const TOWN_ROOT_ENV: &str = "GT_TOWN_ROOT";
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = "daemon/lifecycle.toml";
pub const LEDGER_RELATIVE_PATH: &str = "daemon/lifecycle-ledger.json";

pub const DEFAULT_MAX_MESSAGE_AGE_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_SETTLE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CLAIM_FAILURES: u32 = 3;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SupervisorConfig {
    #[serde(skip)]
    pub town_root: PathBuf,
    /// Mailbox the supervisor reads lifecycle requests from.
    #[serde(default = "default_inbox_identity")]
    pub inbox_identity: String,
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    #[serde(default = "default_max_message_age_secs")]
    pub max_message_age_secs: u64,
    /// Pause between killing a session and recreating one with the same name.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
    #[serde(default = "default_upstream_remote")]
    pub upstream_remote: String,
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default = "default_startup_command")]
    pub startup_command: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_claim_failures")]
    pub max_claim_failures: u32,
    #[serde(default = "default_mail_binary")]
    pub mail_binary: String,
    #[serde(default = "default_tracker_binary")]
    pub tracker_binary: String,
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Directory for rolling log files. Relative paths hang off the town root.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            town_root: PathBuf::new(),
            inbox_identity: default_inbox_identity(),
            session_prefix: default_session_prefix(),
            max_message_age_secs: default_max_message_age_secs(),
            settle_interval_ms: default_settle_interval_ms(),
            upstream_remote: default_upstream_remote(),
            main_branch: default_main_branch(),
            startup_command: default_startup_command(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_claim_failures: default_max_claim_failures(),
            mail_binary: default_mail_binary(),
            tracker_binary: default_tracker_binary(),
            tmux_binary: default_tmux_binary(),
            git_binary: default_git_binary(),
            log_dir: None,
        }
    }
}

impl SupervisorConfig {
    pub fn with_town_root(town_root: impl Into<PathBuf>) -> Self {
        Self {
            town_root: town_root.into(),
            ..Self::default()
        }
    }

    /// Saturates at the largest representable age instead of overflowing.
    pub fn max_message_age(&self) -> chrono::Duration {
        i64::try_from(self.max_message_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.town_root.join(LEDGER_RELATIVE_PATH)
    }

    pub fn resolved_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.town_root.join(dir)
            }
        })
    }
}

fn default_inbox_identity() -> String {
    "deacon/".to_string()
}

fn default_session_prefix() -> String {
    "gt-".to_string()
}

fn default_max_message_age_secs() -> u64 {
    DEFAULT_MAX_MESSAGE_AGE_SECS
}

fn default_settle_interval_ms() -> u64 {
    DEFAULT_SETTLE_INTERVAL_MS
}

fn default_upstream_remote() -> String {
    "origin".to_string()
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_startup_command() -> String {
    "exec claude --dangerously-skip-permissions".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_max_claim_failures() -> u32 {
    DEFAULT_MAX_CLAIM_FAILURES
}

fn default_mail_binary() -> String {
    "gt".to_string()
}

fn default_tracker_binary() -> String {
    "bd".to_string()
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

/// Picks the town root: explicit argument, then `GT_TOWN_ROOT`, then `~/gt`.
pub fn resolve_town_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os(TOWN_ROOT_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(WardenError::HomeDirNotFound)?;
    Ok(home.join("gt"))
}

pub fn default_config_path(town_root: &Path) -> PathBuf {
    town_root.join(DEFAULT_CONFIG_RELATIVE_PATH)
}

/// Loads the config at `path` (or the town default) and binds it to `town_root`.
pub fn load_config(path: Option<PathBuf>, town_root: &Path) -> Result<SupervisorConfig> {
    let config_path = path.unwrap_or_else(|| default_config_path(town_root));

    if !config_path.exists() {
        return Ok(SupervisorConfig::with_town_root(town_root));
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| WardenError::Io {
        context: format!("reading config {}", config_path.display()),
        source: err,
    })?;
    let mut config =
        toml::from_str::<SupervisorConfig>(&content).map_err(|err| WardenError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;
    config.town_root = town_root.to_path_buf();
    Ok(config)
}
