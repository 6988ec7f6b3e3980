//! Local filesystem adapter.
//!
//! Writes go through a temp file in the target's directory followed by a
//! rename, so readers see either the old or the new bytes.

use crate::users::UserDb;
use reconcile::{FileMeta, Filesystem, HostError, HostResult, Ownership, ResolvedOwner};
use std::fs::{self, File, FileTimes, OpenOptions, Permissions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

const MODE_BITS: u32 = 0o7777;
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Filesystem capability backed by `std::fs`
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    users: UserDb,
}

impl LocalFs {
    /// Write `content` to a temp file next to `path` without touching `path`.
    ///
    /// Dropping the returned handle discards the staged write.
    pub fn stage(&self, path: &Path, content: &[u8]) -> HostResult<NamedTempFile> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".converge-")
            .tempfile_in(parent)
            .map_err(|e| HostError::io(parent, e))?;
        staged
            .write_all(content)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| HostError::io(staged.path(), e))?;

        // Carry over owner and mode of the file being replaced. chown clears
        // setuid/setgid, so the mode goes on last.
        let existing = self.metadata(path)?;
        if let Some(meta) = existing {
            std::os::unix::fs::chown(staged.path(), Some(meta.uid), Some(meta.gid))
                .map_err(|e| HostError::io(staged.path(), e))?;
        }
        let mode = existing.map_or(DEFAULT_FILE_MODE, |m| m.mode);
        fs::set_permissions(staged.path(), Permissions::from_mode(mode))
            .map_err(|e| HostError::io(staged.path(), e))?;
        Ok(staged)
    }

    /// Atomically move a staged write into place.
    pub fn commit(&self, staged: NamedTempFile, path: &Path) -> HostResult<()> {
        staged
            .persist(path)
            .map_err(|e| HostError::io(path, e.error))?;
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            // Durability of the rename; failure here does not undo it
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

fn to_meta(meta: &fs::Metadata) -> FileMeta {
    FileMeta {
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode() & MODE_BITS,
        is_dir: meta.is_dir(),
    }
}

fn absent_is_none<T>(path: &Path, result: io::Result<T>) -> HostResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HostError::io(path, e)),
    }
}

impl Filesystem for LocalFs {
    fn metadata(&self, path: &Path) -> HostResult<Option<FileMeta>> {
        Ok(absent_is_none(path, fs::metadata(path))?.map(|m| to_meta(&m)))
    }

    fn read(&self, path: &Path) -> HostResult<Option<Vec<u8>>> {
        absent_is_none(path, fs::read(path))
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> HostResult<()> {
        let staged = self.stage(path, content)?;
        self.commit(staged, path)?;
        log::debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    fn set_owner(&self, path: &Path, owner: ResolvedOwner) -> HostResult<()> {
        log::debug!("chown {}:{:?} {}", owner.uid, owner.gid, path.display());
        std::os::unix::fs::chown(path, Some(owner.uid), owner.gid)
            .map_err(|e| HostError::io(path, e))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> HostResult<()> {
        log::debug!("chmod {mode:04o} {}", path.display());
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| HostError::io(path, e))
    }

    fn copy_preserving(&self, from: &Path, to: &Path) -> HostResult<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
        }
        let source_meta = fs::metadata(from).map_err(|e| HostError::io(from, e))?;
        let mut source = File::open(from).map_err(|e| HostError::io(from, e))?;

        let mut dest = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .map_err(|e| HostError::io(to, e))?;
        io::copy(&mut source, &mut dest).map_err(|e| HostError::io(to, e))?;

        let times = FileTimes::new()
            .set_accessed(source_meta.accessed().map_err(|e| HostError::io(from, e))?)
            .set_modified(source_meta.modified().map_err(|e| HostError::io(from, e))?);
        dest.set_times(times).map_err(|e| HostError::io(to, e))?;
        dest.sync_all().map_err(|e| HostError::io(to, e))?;
        drop(dest);

        std::os::unix::fs::chown(to, Some(source_meta.uid()), Some(source_meta.gid()))
            .map_err(|e| HostError::io(to, e))?;
        fs::set_permissions(to, Permissions::from_mode(source_meta.mode() & MODE_BITS))
            .map_err(|e| HostError::io(to, e))
    }

    fn remove_file(&self, path: &Path) -> HostResult<bool> {
        Ok(absent_is_none(path, fs::remove_file(path))?.is_some())
    }

    fn walk(&self, root: &Path) -> HostResult<Vec<(PathBuf, FileMeta)>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                HostError::io(path, io::Error::from(e))
            })?;
            if entry.path_is_symlink() {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| HostError::io(entry.path(), io::Error::from(e)))?;
            entries.push((entry.into_path(), to_meta(&meta)));
        }
        Ok(entries)
    }

    fn resolve_owner(&self, owner: &Ownership) -> HostResult<ResolvedOwner> {
        self.users.resolve(owner)
    }
}
