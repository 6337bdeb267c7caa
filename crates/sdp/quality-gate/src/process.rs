//! Bounded subprocess invocation.
//!
//! Runs a program with input on stdin and captures its output, killing the
//! child if the deadline passes. Shared by the command reviewer and the
//! command-backed deployment collaborators.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, ReviewerError};

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `program args...`, write `input` to its stdin, and wait at most
/// `timeout` for it to finish.
pub async fn run_with_input(
    program: &str,
    args: &[String],
    input: &str,
    timeout: Duration,
    cwd: Option<&Path>,
) -> Result<ProcessOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| ReviewerError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    })?;

    let stdin = child.stdin.take();
    let payload = input.as_bytes().to_vec();
    let writer = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let run = async {
        let (written, output) = tokio::join!(writer, child.wait_with_output());
        if let Err(e) = written {
            // The child may legitimately exit before reading all input.
            warn!(program = %program, error = %e, "Failed to write process stdin");
        }
        output
    };

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| ReviewerError::Timeout {
            secs: timeout.as_secs(),
        })?
        .map_err(|e| ReviewerError::Io(e.to_string()))?;

    let result = ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    };
    debug!(
        program = %program,
        exit_code = ?result.exit_code,
        stdout_bytes = result.stdout.len(),
        "Process finished"
    );
    Ok(result)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn echoes_stdin() {
        let out = run_with_input("sh", &sh("cat"), "hello", Duration::from_secs(5), None)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[tokio::test]
    async fn captures_exit_code_and_stderr() {
        let out = run_with_input(
            "sh",
            &sh("echo oops >&2; exit 3"),
            "",
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn times_out() {
        let err = run_with_input("sh", &sh("sleep 5"), "", Duration::from_millis(100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_with_input(
            "definitely-not-a-real-program-sdp",
            &[],
            "",
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReviewerError::Spawn { .. }));
    }
}
