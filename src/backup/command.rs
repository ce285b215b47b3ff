//! Invocation of external tools (`mysqldump`, `mysql`, `gpg`, `aws`).
//!
//! Every invocation blocks until the child exits. A non-zero exit becomes
//! [`Error::CommandFailed`] carrying the captured stderr; stderr of a successful run is relayed
//! as a warning.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::process::{Command, Output};

fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Runs `command` to completion, capturing stdout and stderr unless they were redirected.
pub fn run_captured(command: &mut Command) -> Result<Output> {
    let program = program_name(command);
    tracing::trace!("Running: {:?}", command);

    let output = command
        .output()
        .map_err(Error::from)
        .with_msg(format!("Failed to start {program}"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(Error::CommandFailed {
            program,
            status: output.status.to_string(),
            stderr: stderr.into_owned(),
        });
    }

    // relay stderr
    if !stderr.trim().is_empty() {
        tracing::warn!("{program}: {}", stderr.trim_end());
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captured_success_returns_stdout() {
        let output = run_captured(Command::new("sh").args(["-c", "printf 'a\\nb\\n'"])).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "a\nb\n");
    }

    #[test]
    fn test_run_captured_non_zero_exit_carries_stderr() {
        let err = run_captured(Command::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .unwrap_err();
        match err {
            Error::CommandFailed {
                program, stderr, ..
            } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("Expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_run_captured_missing_program() {
        let err = run_captured(&mut Command::new("definitely-not-an-installed-tool-7f3a"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to start"));
    }
}
