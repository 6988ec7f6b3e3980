//! Probe: read-only inspection of current host state
//!
//! Absence is a valid observation, not an error. `ProbeResult::error` is
//! only set when the host could not be inspected at all.

use crate::context::{FileMeta, Host};
use crate::error::HostResult;
use crate::types::{Desired, Ownership, ProbeResult, ResolvedOwner, ResourceAction, fmt_mode};
use std::path::Path;

/// Inspect the current state of an action's target.
pub fn inspect(host: &Host<'_>, action: &ResourceAction) -> ProbeResult {
    let result = match &action.desired {
        Desired::PackageInstalled => probe_package(host, &action.target),
        Desired::FileContent { content } => probe_content(host, &action.path(), content),
        Desired::FileOwnerMode { owner, mode } => {
            probe_owner_mode(host, &action.path(), owner, *mode)
        }
        Desired::ServiceRunning { running, .. } => probe_service(host, &action.target, *running),
        Desired::DirectoryOwnerMode {
            owner,
            dir_mode,
            file_mode,
        } => probe_tree(host, &action.path(), owner, *dir_mode, *file_mode),
    };

    match result {
        Ok(probe) => {
            log::debug!("{}: probe matches={} ({})", action.id, probe.matches, probe.details);
            probe
        }
        Err(e) => {
            log::debug!("{}: probe error: {e}", action.id);
            ProbeResult::failed(e.actionable())
        }
    }
}

/// Short blake3 digest for display
pub fn digest(content: &[u8]) -> String {
    let hash = blake3::hash(content).to_hex();
    hash.as_str()[..12].to_string()
}

/// Whether an entry has the wanted owner and (optionally) mode
pub fn owner_mode_matches(meta: &FileMeta, want: ResolvedOwner, mode: Option<u32>) -> bool {
    meta.uid == want.uid
        && want.gid.is_none_or(|gid| meta.gid == gid)
        && mode.is_none_or(|m| meta.mode == m)
}

fn probe_package(host: &Host<'_>, name: &str) -> HostResult<ProbeResult> {
    if host.packages.is_installed(name)? {
        Ok(ProbeResult::matching("installed"))
    } else {
        Ok(ProbeResult::differing("not installed"))
    }
}

fn probe_content(host: &Host<'_>, path: &Path, desired: &[u8]) -> HostResult<ProbeResult> {
    let Some(current) = host.fs.read(path)? else {
        return Ok(ProbeResult::differing("absent"));
    };

    if current == desired {
        Ok(ProbeResult::matching(format!(
            "content matches ({} bytes, {})",
            current.len(),
            digest(&current)
        )))
    } else {
        Ok(ProbeResult::differing(format!(
            "content differs ({} bytes, {} → {} bytes, {})",
            current.len(),
            digest(&current),
            desired.len(),
            digest(desired)
        )))
    }
}

fn probe_owner_mode(
    host: &Host<'_>,
    path: &Path,
    owner: &Ownership,
    mode: u32,
) -> HostResult<ProbeResult> {
    let Some(meta) = host.fs.metadata(path)? else {
        return Ok(ProbeResult::differing("absent"));
    };
    let want = host.fs.resolve_owner(owner)?;
    let current = format!("{}:{} {}", meta.uid, meta.gid, fmt_mode(meta.mode));

    if owner_mode_matches(&meta, want, Some(mode)) {
        Ok(ProbeResult::matching(current))
    } else {
        Ok(ProbeResult::differing(format!(
            "{current}, want {} {}",
            owner,
            fmt_mode(mode)
        )))
    }
}

fn probe_service(host: &Host<'_>, name: &str, running: bool) -> HostResult<ProbeResult> {
    let is_running = host.services.is_running(name)?;
    let details = if is_running { "running" } else { "stopped" };
    if is_running == running {
        Ok(ProbeResult::matching(details))
    } else {
        Ok(ProbeResult::differing(details))
    }
}

fn probe_tree(
    host: &Host<'_>,
    root: &Path,
    owner: &Ownership,
    dir_mode: Option<u32>,
    file_mode: Option<u32>,
) -> HostResult<ProbeResult> {
    if host.fs.metadata(root)?.is_none() {
        return Ok(ProbeResult::differing("absent"));
    }
    let want = host.fs.resolve_owner(owner)?;
    let entries = host.fs.walk(root)?;

    let offenders: Vec<&Path> = entries
        .iter()
        .filter(|(_, meta)| {
            let mode = if meta.is_dir { dir_mode } else { file_mode };
            !owner_mode_matches(meta, want, mode)
        })
        .map(|(path, _)| path.as_path())
        .collect();

    match offenders.first() {
        None => Ok(ProbeResult::matching(format!(
            "{} entries match",
            entries.len()
        ))),
        Some(first) => Ok(ProbeResult::differing(format!(
            "{} of {} entries differ (first: {})",
            offenders.len(),
            entries.len(),
            first.display()
        ))),
    }
}
