//! Blocking subprocess helper shared by the command-backed ports.
//!
//! No timeouts: a hung child blocks the heartbeat until it exits.

use std::path::Path;
use std::process::{Command, Output};

use crate::error::{Result, WardenError};

/// Runs `program args..` (optionally in `dir`) and returns stdout on success.
pub fn run(program: &str, args: &[&str], dir: Option<&Path>) -> Result<Vec<u8>> {
    let output = spawn(program, args, dir)?;
    if output.status.success() {
        return Ok(output.stdout);
    }
    Err(failure(program, args, &output))
}

/// Like [`run`] but only reports whether the command exited zero.
/// Spawn failures are still errors.
pub fn succeeds(program: &str, args: &[&str], dir: Option<&Path>) -> Result<bool> {
    spawn(program, args, dir).map(|output| output.status.success())
}

fn spawn(program: &str, args: &[&str], dir: Option<&Path>) -> Result<Output> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    command.output().map_err(|err| WardenError::CommandFailed {
        command: render(program, args),
        details: err.to_string(),
    })
}

fn failure(program: &str, args: &[&str], output: &Output) -> WardenError {
    let mut combined = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr);
    }
    WardenError::CommandFailed {
        command: render(program, args),
        details: format!("{} (output: {})", output.status, combined),
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn run_returns_stdout() {
        let stdout = run("sh", &["-c", "printf hello"], None).expect("run");
        assert_eq!(stdout, b"hello");
    }

    #[test]
    fn run_reports_combined_output_on_failure() {
        let err = run("sh", &["-c", "echo out; echo err >&2; exit 3"], None).expect_err("fails");
        let message = err.to_string();
        assert!(message.contains("sh -c"), "{message}");
        assert!(message.contains("out\nerr"), "{message}");
    }

    #[test]
    fn run_honours_working_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let stdout = run("sh", &["-c", "pwd"], Some(dir.path())).expect("run");
        let printed = String::from_utf8_lossy(&stdout);
        let expected = dir.path().canonicalize().expect("canonicalize");
        assert_eq!(
            std::path::Path::new(printed.trim()).canonicalize().expect("canonicalize"),
            expected
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = succeeds("definitely-not-a-real-binary-xyz", &[], None).expect_err("spawn");
        assert!(matches!(err, WardenError::CommandFailed { .. }));
    }

    #[test]
    fn succeeds_reflects_exit_status() {
        assert!(succeeds("sh", &["-c", "exit 0"], None).expect("spawn"));
        assert!(!succeeds("sh", &["-c", "exit 1"], None).expect("spawn"));
    }
}
