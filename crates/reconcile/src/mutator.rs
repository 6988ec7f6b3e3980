//! Mutator: one state-changing operation per action kind
//!
//! The reconciler only calls [`apply`] after the probe showed a mismatch
//! and (for sensitive actions) the validator passed. Confirming that the
//! change landed is the reconciler's re-probe, not the mutator's job.

use crate::context::Host;
use crate::error::HostError;
use crate::probe::owner_mode_matches;
use crate::retry::{RecoveryFailed, RetryPolicy, run_bounded};
use crate::types::{Desired, Ownership, ProbeResult, ResourceAction, fmt_mode};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A mutation that completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub note: String,
    /// Notes from the bounded recovery step, empty when it did not run
    pub recovery: Vec<String>,
}

impl Applied {
    fn plain(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            recovery: Vec::new(),
        }
    }
}

/// A mutation that was attempted and failed
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct MutationError {
    pub reason: String,
    pub recovery: Vec<String>,
}

impl From<HostError> for MutationError {
    fn from(err: HostError) -> Self {
        Self {
            reason: err.actionable(),
            recovery: Vec::new(),
        }
    }
}

/// Apply the desired state of `action` to the host.
pub fn apply(
    host: &Host<'_>,
    action: &ResourceAction,
    retry: &RetryPolicy,
) -> Result<Applied, MutationError> {
    let path = action.path();
    match &action.desired {
        Desired::PackageInstalled => install_package(host, &action.target, retry),
        Desired::FileContent { content } => {
            host.fs.write_atomic(&path, content)?;
            Ok(Applied::plain(format!(
                "wrote {} bytes to {}",
                content.len(),
                path.display()
            )))
        }
        Desired::FileOwnerMode { owner, mode } => set_owner_mode(host, &path, owner, *mode),
        Desired::ServiceRunning {
            running,
            stale_files,
        } => {
            if *running {
                start_service(host, &action.target, stale_files, retry)
            } else {
                host.services.stop(&action.target)?;
                Ok(Applied::plain(format!("stopped {}", action.target)))
            }
        }
        Desired::DirectoryOwnerMode {
            owner,
            dir_mode,
            file_mode,
        } => set_tree(host, &path, owner, *dir_mode, *file_mode),
    }
}

fn install_package(
    host: &Host<'_>,
    name: &str,
    retry: &RetryPolicy,
) -> Result<Applied, MutationError> {
    let attempted = run_bounded(
        retry,
        || host.packages.install(name),
        HostError::is_retryable,
        |err| Ok(format!("retried install after: {}", err.category().advice())),
    );

    match attempted.result {
        Ok(()) => Ok(Applied {
            note: format!("installed {name}"),
            recovery: attempted.recovery,
        }),
        Err(e) => Err(MutationError {
            reason: format!(
                "install of {name} failed after {} attempt(s): {}",
                attempted.attempts,
                e.actionable()
            ),
            recovery: attempted.recovery,
        }),
    }
}

fn set_owner_mode(
    host: &Host<'_>,
    path: &Path,
    owner: &Ownership,
    mode: u32,
) -> Result<Applied, MutationError> {
    if host.fs.metadata(path)?.is_none() {
        return Err(MutationError {
            reason: format!(
                "{} does not exist (create it with a file_content action first)",
                path.display()
            ),
            recovery: Vec::new(),
        });
    }
    let resolved = host.fs.resolve_owner(owner)?;
    // Owner first: chown clears setuid/setgid bits on most systems
    host.fs.set_owner(path, resolved)?;
    host.fs.set_mode(path, mode)?;
    Ok(Applied::plain(format!(
        "chown {owner} and chmod {} {}",
        fmt_mode(mode),
        path.display()
    )))
}

fn start_service(
    host: &Host<'_>,
    name: &str,
    stale_files: &[PathBuf],
    retry: &RetryPolicy,
) -> Result<Applied, MutationError> {
    let attempted = run_bounded(
        retry,
        || host.services.start(name),
        |_| true,
        |_| recover_service(host, name, stale_files),
    );

    match attempted.result {
        Ok(()) => {
            let note = if attempted.recovered() {
                format!("started {name} after recovery")
            } else {
                format!("started {name}")
            };
            Ok(Applied {
                note,
                recovery: attempted.recovery,
            })
        }
        Err(e) => Err(MutationError {
            reason: format!(
                "could not start {name} after {} attempt(s): {}",
                attempted.attempts,
                e.actionable()
            ),
            recovery: attempted.recovery,
        }),
    }
}

/// Bounded recovery: clear stale lock/pid artifacts and failed state
fn recover_service(
    host: &Host<'_>,
    name: &str,
    stale_files: &[PathBuf],
) -> Result<String, RecoveryFailed> {
    let mut removed = Vec::new();
    let cleared = stale_files
        .iter()
        .try_for_each(|file| {
            if host.fs.remove_file(file)? {
                removed.push(file.display().to_string());
            }
            Ok::<(), HostError>(())
        })
        .and_then(|()| host.services.reset(name));

    match cleared {
        Ok(()) if removed.is_empty() => Ok(format!("reset {name} (no stale files present)")),
        Ok(()) => Ok(format!("removed stale {}", removed.join(", "))),
        Err(error) => Err(RecoveryFailed {
            partial: (!removed.is_empty())
                .then(|| format!("removed stale {} before recovery failed", removed.join(", "))),
            error,
        }),
    }
}

fn set_tree(
    host: &Host<'_>,
    root: &Path,
    owner: &Ownership,
    dir_mode: Option<u32>,
    file_mode: Option<u32>,
) -> Result<Applied, MutationError> {
    if host.fs.metadata(root)?.is_none() {
        return Err(MutationError {
            reason: format!("{} does not exist", root.display()),
            recovery: Vec::new(),
        });
    }
    let resolved = host.fs.resolve_owner(owner)?;
    let entries = host.fs.walk(root)?;
    let total = entries.len();
    let mut changed = 0;

    for (path, meta) in entries {
        let mode = if meta.is_dir { dir_mode } else { file_mode };
        if owner_mode_matches(&meta, resolved, mode) {
            continue;
        }

        if !owner_mode_matches(&meta, resolved, None) {
            host.fs.set_owner(&path, resolved)?;
        }
        if let Some(m) = mode {
            host.fs.set_mode(&path, m)?;
        }
        changed += 1;
    }

    Ok(Applied::plain(format!(
        "updated {changed} of {total} entries under {}",
        root.display()
    )))
}

/// Describe what [`apply`] would do, precise enough to repeat by hand.
pub fn describe(action: &ResourceAction, probe: &ProbeResult) -> String {
    let target = &action.target;
    match &action.desired {
        Desired::PackageInstalled => format!("would install package {target}"),
        Desired::FileContent { content } => format!(
            "would atomically write {} bytes to {target} (currently {})",
            content.len(),
            probe.details
        ),
        Desired::FileOwnerMode { owner, mode } => format!(
            "would run `chown {owner} {target} && chmod {} {target}` (currently {})",
            fmt_mode(*mode),
            probe.details
        ),
        Desired::ServiceRunning {
            running,
            stale_files,
        } => {
            if !*running {
                return format!("would stop service {target}");
            }
            if stale_files.is_empty() {
                format!("would start service {target}")
            } else {
                let files: Vec<String> =
                    stale_files.iter().map(|f| f.display().to_string()).collect();
                format!(
                    "would start service {target} (on failure: remove {} and retry once)",
                    files.join(", ")
                )
            }
        }
        Desired::DirectoryOwnerMode {
            owner,
            dir_mode,
            file_mode,
        } => {
            let mut cmd = format!("would run `chown -R {owner} {target}`");
            if let Some(m) = dir_mode {
                cmd.push_str(&format!(", chmod {} on directories", fmt_mode(*m)));
            }
            if let Some(m) = file_mode {
                cmd.push_str(&format!(", chmod {} on files", fmt_mode(*m)));
            }
            format!("{cmd} ({})", probe.details)
        }
    }
}

/// Unified line diff between the current and desired file content
pub fn content_diff(current: &[u8], desired: &[u8]) -> String {
    let old = String::from_utf8_lossy(current);
    let new = String::from_utf8_lossy(desired);
    similar::TextDiff::from_lines(old.as_ref(), new.as_ref())
        .unified_diff()
        .context_radius(2)
        .header("current", "desired")
        .to_string()
}
