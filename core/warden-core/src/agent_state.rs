//! Agent-owned `state.json` access.
//!
//! The agent is the authoritative writer of its state file. The supervisor
//! reads it to confirm readiness and, after a successful restart, removes the
//! request keys it consumed. Every other key is written back untouched.
//!
//! # File Format
//!
//! ```json
//! {
//!   "requesting_cycle": true,
//!   "requesting_time": "2026-03-01T10:00:00Z",
//!   "...": "agent-defined keys, preserved verbatim"
//! }
//! ```
//!
//! There is no lock between verification and clearing; an agent rewriting its
//! file in that window can lose the race. That is accepted.

use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, WardenError};
use crate::request::LifecycleAction;

pub const REQUESTING_TIME_KEY: &str = "requesting_time";

/// Fail-closed readiness gate: passes only on a literal boolean `true`.
pub fn verify_requesting(path: &Path, action: LifecycleAction) -> Result<()> {
    let key = action.request_flag();
    let state = read_state(path, &key)?;

    match state.get(&key) {
        None => Err(WardenError::RequestFlagMissing {
            path: path.to_path_buf(),
            key,
        }),
        Some(Value::Bool(true)) => {
            debug!(path = %path.display(), key = %key, "Agent readiness verified");
            Ok(())
        }
        Some(other) => Err(WardenError::RequestFlagNotTrue {
            key,
            value: other.to_string(),
        }),
    }
}

/// Whether the flag is currently `true`, swallowing every read error.
pub fn is_requesting(path: &Path, action: LifecycleAction) -> bool {
    verify_requesting(path, action).is_ok()
}

/// Removes `requesting_<action>` and `requesting_time`, preserving all other keys.
pub fn clear_requesting(path: &Path, action: LifecycleAction) -> Result<()> {
    let key = action.request_flag();
    let mut state = read_state(path, &key)?;

    state.shift_remove(&key);
    state.shift_remove(REQUESTING_TIME_KEY);

    write_state(path, &state)?;
    info!(path = %path.display(), key = %key, "Cleared agent request flag");
    Ok(())
}

fn read_state(path: &Path, key: &str) -> Result<Map<String, Value>> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(WardenError::StateFileMissing {
                path: path.to_path_buf(),
                key: key.to_string(),
            })
        }
        Err(err) => {
            return Err(WardenError::StateUnreadable {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(WardenError::StateMalformed {
            path: path.to_path_buf(),
            details: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(err) => Err(WardenError::StateMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        }),
    }
}

fn write_state(path: &Path, state: &Map<String, Value>) -> Result<()> {
    let content = serde_json::to_string_pretty(state).map_err(|err| WardenError::Json {
        context: format!("serializing {}", path.display()),
        source: err,
    })?;

    let parent_dir = path.parent().ok_or_else(|| WardenError::Io {
        context: format!("state file has no parent directory: {}", path.display()),
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;
    let io_err = |context: &str, source: std::io::Error| WardenError::Io {
        context: format!("{context} {}", path.display()),
        source,
    };

    let mut temp_file =
        NamedTempFile::new_in(parent_dir).map_err(|err| io_err("creating temp file for", err))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|err| io_err("writing temp file for", err))?;
    temp_file
        .flush()
        .map_err(|err| io_err("flushing temp file for", err))?;
    temp_file
        .persist(path)
        .map_err(|err| io_err("replacing", err.error))?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state_file(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("state.json");
        fs_err::write(&path, content).expect("write state");
        path
    }

    #[test]
    fn passes_only_on_literal_true() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = state_file(&dir, r#"{"requesting_cycle": true}"#);
        verify_requesting(&path, LifecycleAction::Cycle).expect("verified");
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = verify_requesting(&dir.path().join("state.json"), LifecycleAction::Cycle)
            .expect_err("missing");
        assert!(matches!(err, WardenError::StateFileMissing { .. }));
        assert!(err.is_precondition());
    }

    #[test]
    fn unparseable_and_non_object_files_fail() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = state_file(&dir, "{not json");
        let err = verify_requesting(&path, LifecycleAction::Cycle).expect_err("garbage");
        assert!(matches!(err, WardenError::StateMalformed { .. }));

        let path = state_file(&dir, "[true]");
        let err = verify_requesting(&path, LifecycleAction::Cycle).expect_err("array");
        assert!(matches!(err, WardenError::StateMalformed { .. }));
    }

    #[test]
    fn missing_false_and_non_boolean_flags_fail() {
        let dir = tempfile::tempdir().expect("temp dir");

        let path = state_file(&dir, r#"{"requesting_restart": true}"#);
        let err = verify_requesting(&path, LifecycleAction::Cycle).expect_err("other action");
        assert!(matches!(err, WardenError::RequestFlagMissing { .. }));

        for value in ["false", "\"true\"", "1", "null"] {
            let path = state_file(&dir, &format!(r#"{{"requesting_cycle": {value}}}"#));
            let err = verify_requesting(&path, LifecycleAction::Cycle).expect_err(value);
            assert!(
                matches!(err, WardenError::RequestFlagNotTrue { .. }),
                "{value}: {err}"
            );
        }
    }

    #[test]
    fn verification_never_writes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let original = r#"{"requesting_cycle":false,"note":"x"}"#;
        let path = state_file(&dir, original);
        let _ = verify_requesting(&path, LifecycleAction::Cycle);
        assert_eq!(fs_err::read_to_string(&path).expect("read"), original);
    }

    #[test]
    fn clear_removes_exactly_the_request_keys() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = state_file(
            &dir,
            r#"{
  "zeta": 1,
  "requesting_cycle": true,
  "requesting_time": "2026-03-01T10:00:00Z",
  "requesting_shutdown": true,
  "handoff": {"notes": ["a", "b"]},
  "alpha": null
}"#,
        );

        clear_requesting(&path, LifecycleAction::Cycle).expect("clear");

        let content = fs_err::read_to_string(&path).expect("read");
        let state: Map<String, Value> = serde_json::from_str(&content).expect("parse");
        let keys: Vec<_> = state.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "requesting_shutdown", "handoff", "alpha"]);
        assert_eq!(state["handoff"]["notes"][1], "b");
        assert!(content.contains("\n  \"zeta\": 1"));
    }

    #[test]
    fn clear_fails_on_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = clear_requesting(&dir.path().join("state.json"), LifecycleAction::Restart)
            .expect_err("missing");
        assert!(matches!(err, WardenError::StateFileMissing { .. }));
    }
}
