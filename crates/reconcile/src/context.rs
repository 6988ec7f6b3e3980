//! Host capability traits
//!
//! The reconciler reaches the live host only through these traits, so the
//! core stays a function of `(actions, host) -> RunReport` and every
//! collaborator can be replaced by a fake in tests.

use crate::error::HostResult;
use crate::types::{ActionOutcome, Ownership, ResolvedOwner, ResourceAction, Verdict};
use std::path::{Path, PathBuf};

/// Host package manager
pub trait PackageManager {
    /// Whether the package is installed
    fn is_installed(&self, name: &str) -> HostResult<bool>;

    /// Install the package
    fn install(&self, name: &str) -> HostResult<()>;
}

/// Host service manager
pub trait ServiceManager {
    /// Whether the service is currently running
    fn is_running(&self, name: &str) -> HostResult<bool>;

    /// Start the service
    fn start(&self, name: &str) -> HostResult<()>;

    /// Stop the service
    fn stop(&self, name: &str) -> HostResult<()>;

    /// Clear a failed/blocked state before a retry
    fn reset(&self, _name: &str) -> HostResult<()> {
        Ok(())
    }
}

/// Ownership and permission bits of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits including setuid/setgid/sticky (`& 0o7777`)
    pub mode: u32,
    pub is_dir: bool,
}

/// Host filesystem
pub trait Filesystem {
    /// Metadata of the entry, `None` when absent
    fn metadata(&self, path: &Path) -> HostResult<Option<FileMeta>>;

    /// File contents, `None` when absent
    fn read(&self, path: &Path) -> HostResult<Option<Vec<u8>>>;

    /// Replace the file's contents so readers see either the old or the new bytes
    fn write_atomic(&self, path: &Path, content: &[u8]) -> HostResult<()>;

    /// Change owner (and group when given)
    fn set_owner(&self, path: &Path, owner: ResolvedOwner) -> HostResult<()>;

    /// Change permission bits
    fn set_mode(&self, path: &Path, mode: u32) -> HostResult<()>;

    /// Copy preserving owner, mode and timestamps; must not overwrite `to`
    fn copy_preserving(&self, from: &Path, to: &Path) -> HostResult<()>;

    /// Remove a file, returning false when it was already absent
    fn remove_file(&self, path: &Path) -> HostResult<bool>;

    /// Every entry under `root` (including `root`), symlinks excluded
    fn walk(&self, root: &Path) -> HostResult<Vec<(PathBuf, FileMeta)>>;

    /// Resolve user/group names to ids
    fn resolve_owner(&self, owner: &Ownership) -> HostResult<ResolvedOwner>;
}

/// Syntax checker for policy-like files
pub trait PolicyChecker {
    /// Check candidate content destined for `target`, in isolation from the live file
    fn check(&self, target: &Path, candidate: &[u8]) -> HostResult<Verdict>;
}

/// Mount options of the filesystem holding a path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountFlags {
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub read_only: bool,
    pub nosuid: bool,
}

impl MountFlags {
    /// Filesystems that synthesize or ignore unix ownership and modes
    pub fn maps_permissions(&self) -> bool {
        matches!(
            self.fs_type.as_str(),
            "vfat" | "exfat" | "msdos" | "ntfs" | "ntfs3" | "fuseblk" | "9p" | "drvfs" | "cifs"
                | "smb3" | "v9fs"
        )
    }
}

/// Mount-table inspector
pub trait MountInspector {
    fn flags_for(&self, path: &Path) -> HostResult<MountFlags>;
}

/// The full capability set handed to the reconciler
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub packages: &'a dyn PackageManager,
    pub services: &'a dyn ServiceManager,
    pub fs: &'a dyn Filesystem,
    pub checker: &'a dyn PolicyChecker,
    pub mounts: &'a dyn MountInspector,
}

/// Receives per-action progress during a run
///
/// Implement this trait to print status lines, drive a spinner, etc.
pub trait RunObserver {
    /// Called before an action leaves `Pending`
    fn on_action_start(&mut self, index: usize, total: usize, action: &ResourceAction);

    /// Called once the action reached a terminal status
    fn on_action_complete(&mut self, outcome: &ActionOutcome);
}

/// No-op observer
pub struct NoProgress;

impl RunObserver for NoProgress {
    fn on_action_start(&mut self, _index: usize, _total: usize, _action: &ResourceAction) {}
    fn on_action_complete(&mut self, _outcome: &ActionOutcome) {}
}
