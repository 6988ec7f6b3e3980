//! Timeout-bounded command execution.
//!
//! Output is captured into anonymous temp files rather than pipes, so a
//! chatty child can never block on a full pipe while we poll for its exit.

use reconcile::{HostError, HostResult};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Default budget for one external command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stderr, falling back to stdout when stderr is empty
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs external commands with a hard time budget
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            // Stable, parseable tool output
            env: vec![("LC_ALL".to_string(), "C".to_string())],
        }
    }

    /// Add an environment variable for every command this runner starts
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Run a command to completion or until the timeout, whichever is first.
    ///
    /// A non-zero exit is not an error here; see [`Self::run_checked`].
    pub fn run(&self, program: &str, args: &[&str]) -> HostResult<CommandOutput> {
        let line = command_line(program, args);
        log::debug!("Running: {line}");

        let stdout = scratch_file()?;
        let stderr = scratch_file()?;

        let mut child = Command::new(program)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(clone_handle(&stdout)?))
            .stderr(Stdio::from(clone_handle(&stderr)?))
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::debug!("Timed out after {}s: {line}", self.timeout.as_secs());
                    return Err(HostError::Timeout {
                        command: line,
                        secs: self.timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(HostError::CommandFailed {
                        command: line,
                        stderr: e.to_string(),
                    });
                }
            }
        };

        let output = CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: read_back(stdout)?,
            stderr: read_back(stderr)?,
        };
        log::debug!("Exit {:?}: {line}", output.code);
        Ok(output)
    }

    /// Run a command and turn a non-zero exit into `CommandFailed`
    pub fn run_checked(&self, program: &str, args: &[&str]) -> HostResult<CommandOutput> {
        let output = self.run(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(HostError::CommandFailed {
                command: command_line(program, args),
                stderr: output.diagnostic(),
            })
        }
    }

    /// Run a command and report only whether it exited zero
    pub fn succeeds(&self, program: &str, args: &[&str]) -> HostResult<bool> {
        Ok(self.run(program, args)?.success)
    }
}

/// Render a command for logs and error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

fn scratch_file() -> HostResult<File> {
    tempfile::tempfile().map_err(|e| HostError::io(std::env::temp_dir(), e))
}

fn clone_handle(file: &File) -> HostResult<File> {
    file.try_clone()
        .map_err(|e| HostError::io(std::env::temp_dir(), e))
}

fn read_back(mut file: File) -> HostResult<String> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut buf))
        .map_err(|e| HostError::io(std::env::temp_dir(), e))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn spawn_error(program: &str, err: std::io::Error) -> HostError {
    if err.kind() == ErrorKind::NotFound {
        HostError::Unsupported(format!("{program} is not installed"))
    } else {
        HostError::io(program, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::ErrorCategory;

    #[test]
    fn test_captures_output() {
        let runner = CommandRunner::default();
        let output = runner
            .run("sh", &["-c", "echo out; echo err >&2; exit 3"])
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn test_timeout_kills_child() {
        let runner = CommandRunner::new(Duration::from_millis(200));
        let start = Instant::now();
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.is_retryable());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program_is_unsupported() {
        let err = CommandRunner::default()
            .run("converge-no-such-tool", &[])
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unsupported);
    }

    #[test]
    fn test_run_checked_reports_stderr() {
        let err = CommandRunner::default()
            .run_checked("sh", &["-c", "echo 'E: broken' >&2; exit 1"])
            .unwrap_err();
        assert_eq!(err.to_string(), "`sh -c echo 'E: broken' >&2; exit 1` failed: E: broken");
    }

    #[test]
    fn test_env_is_passed() {
        let runner = CommandRunner::default().with_env("CONVERGE_PROBE", "yes");
        let output = runner.run("sh", &["-c", "echo $CONVERGE_PROBE $LC_ALL"]).unwrap();
        assert_eq!(output.stdout.trim(), "yes C");
    }
}
