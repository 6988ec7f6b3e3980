//! Syntax checking of candidate content in isolation.
//!
//! Candidate bytes are written to a scratch file and the checker runs
//! against that file; the live target is never passed to a checker.

use crate::runner::CommandRunner;
use reconcile::{HostError, HostResult, PolicyChecker, Verdict};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the scratch file path
pub const PATH_PLACEHOLDER: &str = "{}";

/// Chooses and runs a syntax checker per target
pub struct CommandChecker {
    runner: CommandRunner,
    overrides: HashMap<PathBuf, Vec<String>>,
}

impl CommandChecker {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            overrides: HashMap::new(),
        }
    }

    /// Use an explicit checker command for `target`, or for every file
    /// under it when `target` is a directory
    pub fn with_override(mut self, target: impl Into<PathBuf>, command: Vec<String>) -> Self {
        self.overrides.insert(target.into(), command);
        self
    }

    /// The checker command for `target`, `None` for the generic check
    pub fn command_for(&self, target: &Path, candidate: &[u8]) -> Option<Vec<String>> {
        if let Some(command) = target.ancestors().find_map(|dir| self.overrides.get(dir)) {
            return Some(command.clone());
        }
        let owned = |parts: &[&str]| Some(parts.iter().map(|s| (*s).to_string()).collect());
        if is_sudoers(target) {
            return owned(&["visudo", "-c", "-q", "-f", PATH_PLACEHOLDER]);
        }
        if let Some(shell) = shell_shebang(candidate) {
            return owned(&[shell, "-n", PATH_PLACEHOLDER]);
        }
        None
    }

    fn run_checker(&self, target: &Path, command: &[String], candidate: &[u8]) -> HostResult<Verdict> {
        let mut scratch = tempfile::Builder::new()
            .prefix(".converge-check-")
            .tempfile()
            .map_err(|e| HostError::io(std::env::temp_dir(), e))?;
        scratch
            .write_all(candidate)
            .and_then(|()| scratch.flush())
            .map_err(|e| HostError::io(scratch.path(), e))?;

        let scratch_path = scratch.path().display().to_string();
        let args: Vec<String> = command
            .iter()
            .skip(1)
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &scratch_path))
            .collect();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let Some(program) = command.first() else {
            return Err(HostError::Unsupported(format!(
                "empty checker command for {}",
                target.display()
            )));
        };

        let output = self.runner.run(program, &arg_refs)?;
        if output.success {
            Ok(Verdict::Pass)
        } else {
            let diagnostic = output.diagnostic().replace(&scratch_path, &target.display().to_string());
            let first = diagnostic.lines().next().unwrap_or_default().trim().to_string();
            if first.is_empty() {
                Ok(Verdict::fail(format!("rejected by {program}")))
            } else {
                Ok(Verdict::fail(format!("{program}: {first}")))
            }
        }
    }
}

impl PolicyChecker for CommandChecker {
    fn check(&self, target: &Path, candidate: &[u8]) -> HostResult<Verdict> {
        match self.command_for(target, candidate) {
            Some(command) => self.run_checker(target, &command, candidate),
            None => {
                log::warn!(
                    "No syntax checker for {}; only generic checks ran",
                    target.display()
                );
                Ok(generic_check(candidate))
            }
        }
    }
}

fn is_sudoers(target: &Path) -> bool {
    target == Path::new("/etc/sudoers") || target.starts_with("/etc/sudoers.d")
}

/// The shell named by a `#!` line, which also parses the candidate
fn shell_shebang(candidate: &[u8]) -> Option<&'static str> {
    let first = candidate.split(|b| *b == b'\n').next().unwrap_or_default();
    let line = std::str::from_utf8(first).ok()?;
    let interpreter = line.strip_prefix("#!")?;
    let mut words = interpreter.split_whitespace();
    let program = match words.next()? {
        p if p.ends_with("/env") => words.next().unwrap_or_default(),
        p => p.rsplit('/').next().unwrap_or(p),
    };
    match program {
        "sh" => Some("sh"),
        "bash" => Some("bash"),
        "dash" => Some("dash"),
        _ => None,
    }
}

/// Sanity check used when no dedicated checker applies
pub fn generic_check(candidate: &[u8]) -> Verdict {
    if candidate.is_empty() {
        return Verdict::fail("candidate content is empty");
    }
    // Binary content (an executable whose mode is being set) is not ours to parse
    if candidate.contains(&0) {
        return Verdict::Pass;
    }
    match std::str::from_utf8(candidate) {
        Ok(_) => Verdict::Pass,
        Err(e) => Verdict::fail(format!("candidate is not valid UTF-8: {e}")),
    }
}
