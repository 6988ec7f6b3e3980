//! Backup: snapshot a file before it is mutated
//!
//! Snapshots live under `<backup_dir>/<run_id>/<absolute target path>`.
//! Within one run each target is copied at most once; later calls return
//! the recorded path.

use crate::context::Filesystem;
use crate::error::{HostError, HostResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

const MAX_COLLISION_SUFFIX: u32 = 100;

/// Per-run registry of snapshots
#[derive(Debug)]
pub struct BackupStore {
    root: PathBuf,
    snapshots: HashMap<PathBuf, PathBuf>,
}

impl BackupStore {
    /// Create a store rooted at `<backup_dir>/<run_id>`
    pub fn new(backup_dir: &Path, run_id: &str) -> Self {
        Self {
            root: backup_dir.join(run_id),
            snapshots: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot `path`, returning the backup location.
    ///
    /// Returns `None` when the target does not exist (nothing to preserve).
    pub fn snapshot(&mut self, fs: &dyn Filesystem, path: &Path) -> HostResult<Option<PathBuf>> {
        if let Some(existing) = self.snapshots.get(path) {
            log::debug!(
                "Backup of {} already taken this run: {}",
                path.display(),
                existing.display()
            );
            return Ok(Some(existing.clone()));
        }

        if fs.metadata(path)?.is_none() {
            return Ok(None);
        }

        let base = self.root.join(relative(path));
        let mut candidate = base.clone();
        let mut suffix = 0;
        loop {
            match fs.copy_preserving(path, &candidate) {
                Ok(()) => break,
                Err(e) if is_already_exists(&e) && suffix < MAX_COLLISION_SUFFIX => {
                    suffix += 1;
                    candidate = with_suffix(&base, suffix);
                }
                Err(e) => return Err(e),
            }
        }

        log::info!("Backed up {} to {}", path.display(), candidate.display());
        self.snapshots.insert(path.to_path_buf(), candidate.clone());
        Ok(Some(candidate))
    }

    /// Backups taken so far, keyed by original path
    pub fn taken(&self) -> &HashMap<PathBuf, PathBuf> {
        &self.snapshots
    }
}

/// Strip root and prefix components so the path nests under the store
fn relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn with_suffix(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn is_already_exists(err: &HostError) -> bool {
    matches!(err, HostError::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists)
}
