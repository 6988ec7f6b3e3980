//! In-memory fake host used by the unit tests.
//!
//! One struct implements all five capabilities so that, for example, a
//! service start can fail while a stale pid file exists in the fake
//! filesystem. Every mutating call is counted so tests can act as spies.

use crate::context::{
    FileMeta, Filesystem, Host, MountFlags, MountInspector, PackageManager, PolicyChecker,
    ServiceManager,
};
use crate::error::{HostError, HostResult};
use crate::types::{Ownership, ResolvedOwner, Verdict};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct Entry {
    /// `None` for directories
    content: Option<Vec<u8>>,
    meta: FileMeta,
}

pub struct FakeHost {
    packages: RefCell<HashSet<String>>,
    install_failures: RefCell<HashMap<String, VecDeque<HostError>>>,
    phantom_installs: RefCell<HashSet<String>>,
    running: RefCell<HashSet<String>>,
    start_blockers: RefCell<HashMap<String, PathBuf>>,
    entries: RefCell<BTreeMap<PathBuf, Entry>>,
    unreadable: RefCell<HashSet<PathBuf>>,
    ignore_permission_changes: Cell<bool>,
    verdicts: RefCell<HashMap<PathBuf, Verdict>>,
    mount: RefCell<MountFlags>,
    failing_copies: Cell<bool>,
    failing_reset: Cell<bool>,

    pub install_calls: Cell<usize>,
    pub start_calls: Cell<usize>,
    pub stop_calls: Cell<usize>,
    pub reset_calls: Cell<usize>,
    pub write_calls: Cell<usize>,
    pub copy_calls: Cell<usize>,
    pub owner_calls: Cell<usize>,
    pub mode_calls: Cell<usize>,
    pub remove_calls: Cell<usize>,
    pub check_calls: Cell<usize>,
    pub probe_calls: Cell<usize>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            packages: RefCell::new(HashSet::new()),
            install_failures: RefCell::new(HashMap::new()),
            phantom_installs: RefCell::new(HashSet::new()),
            running: RefCell::new(HashSet::new()),
            start_blockers: RefCell::new(HashMap::new()),
            entries: RefCell::new(BTreeMap::new()),
            unreadable: RefCell::new(HashSet::new()),
            ignore_permission_changes: Cell::new(false),
            verdicts: RefCell::new(HashMap::new()),
            mount: RefCell::new(MountFlags {
                mount_point: PathBuf::from("/"),
                fs_type: "ext4".to_string(),
                read_only: false,
                nosuid: false,
            }),
            failing_copies: Cell::new(false),
            failing_reset: Cell::new(false),
            install_calls: Cell::new(0),
            start_calls: Cell::new(0),
            stop_calls: Cell::new(0),
            reset_calls: Cell::new(0),
            write_calls: Cell::new(0),
            copy_calls: Cell::new(0),
            owner_calls: Cell::new(0),
            mode_calls: Cell::new(0),
            remove_calls: Cell::new(0),
            check_calls: Cell::new(0),
            probe_calls: Cell::new(0),
        }
    }

    pub fn host(&self) -> Host<'_> {
        Host {
            packages: self,
            services: self,
            fs: self,
            checker: self,
            mounts: self,
        }
    }

    // ── setup ────────────────────────────────────────────────────────

    pub fn with_package(self, name: &str) -> Self {
        self.packages.borrow_mut().insert(name.to_string());
        self
    }

    pub fn fail_install(self, name: &str, err: HostError) -> Self {
        self.install_failures
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push_back(err);
        self
    }

    /// Install reports success but the package never shows up
    pub fn phantom_install(self, name: &str) -> Self {
        self.phantom_installs.borrow_mut().insert(name.to_string());
        self
    }

    pub fn with_running(self, name: &str) -> Self {
        self.running.borrow_mut().insert(name.to_string());
        self
    }

    /// Starting `service` fails while `path` exists
    pub fn block_start_while(self, service: &str, path: &str) -> Self {
        self.start_blockers
            .borrow_mut()
            .insert(service.to_string(), PathBuf::from(path));
        self
    }

    pub fn with_file(self, path: &str, content: &[u8], uid: u32, gid: u32, mode: u32) -> Self {
        self.entries.borrow_mut().insert(
            PathBuf::from(path),
            Entry {
                content: Some(content.to_vec()),
                meta: FileMeta {
                    uid,
                    gid,
                    mode,
                    is_dir: false,
                },
            },
        );
        self
    }

    pub fn with_dir(self, path: &str, uid: u32, gid: u32, mode: u32) -> Self {
        self.entries.borrow_mut().insert(
            PathBuf::from(path),
            Entry {
                content: None,
                meta: FileMeta {
                    uid,
                    gid,
                    mode,
                    is_dir: true,
                },
            },
        );
        self
    }

    pub fn unreadable(self, path: &str) -> Self {
        self.unreadable.borrow_mut().insert(PathBuf::from(path));
        self
    }

    /// Owner/mode changes report success but have no effect
    pub fn ignoring_permission_changes(self, fs_type: &str) -> Self {
        self.ignore_permission_changes.set(true);
        self.mount.borrow_mut().fs_type = fs_type.to_string();
        self
    }

    pub fn nosuid(self) -> Self {
        self.mount.borrow_mut().nosuid = true;
        self
    }

    pub fn read_only(self, mount_point: &str) -> Self {
        self.mount.borrow_mut().mount_point = PathBuf::from(mount_point);
        self.mount.borrow_mut().read_only = true;
        self
    }

    /// Every `copy_preserving` fails, as on a full backup disk
    pub fn failing_backups(self) -> Self {
        self.failing_copies.set(true);
        self
    }

    /// Clearing a service's failed state fails
    pub fn failing_reset(self) -> Self {
        self.failing_reset.set(true);
        self
    }

    pub fn reject(self, path: &str, reason: &str) -> Self {
        self.verdicts
            .borrow_mut()
            .insert(PathBuf::from(path), Verdict::fail(reason));
        self
    }

    // ── inspection ───────────────────────────────────────────────────

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.entries
            .borrow()
            .get(Path::new(path))
            .and_then(|e| e.content.clone())
    }

    pub fn meta(&self, path: &str) -> Option<FileMeta> {
        self.entries.borrow().get(Path::new(path)).map(|e| e.meta)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.borrow().contains_key(Path::new(path))
    }

    pub fn installed(&self, name: &str) -> bool {
        self.packages.borrow().contains(name)
    }

    pub fn is_service_running(&self, name: &str) -> bool {
        self.running.borrow().contains(name)
    }

    /// Number of calls that change host state
    pub fn mutations(&self) -> usize {
        self.install_calls.get()
            + self.start_calls.get()
            + self.stop_calls.get()
            + self.write_calls.get()
            + self.owner_calls.get()
            + self.mode_calls.get()
            + self.remove_calls.get()
    }

    fn denied(&self, path: &Path) -> HostResult<()> {
        if self.unreadable.borrow().contains(path) {
            return Err(HostError::Permission {
                message: path.display().to_string(),
            });
        }
        Ok(())
    }
}

impl PackageManager for FakeHost {
    fn is_installed(&self, name: &str) -> HostResult<bool> {
        bump(&self.probe_calls);
        Ok(self.packages.borrow().contains(name))
    }

    fn install(&self, name: &str) -> HostResult<()> {
        bump(&self.install_calls);
        if let Some(err) = self
            .install_failures
            .borrow_mut()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        if !self.phantom_installs.borrow().contains(name) {
            self.packages.borrow_mut().insert(name.to_string());
        }
        Ok(())
    }
}

impl ServiceManager for FakeHost {
    fn is_running(&self, name: &str) -> HostResult<bool> {
        bump(&self.probe_calls);
        Ok(self.running.borrow().contains(name))
    }

    fn start(&self, name: &str) -> HostResult<()> {
        bump(&self.start_calls);
        if let Some(blocker) = self.start_blockers.borrow().get(name)
            && self.entries.borrow().contains_key(blocker)
        {
            return Err(HostError::CommandFailed {
                command: format!("systemctl start {name}"),
                stderr: format!("stale pid file {}", blocker.display()),
            });
        }
        self.running.borrow_mut().insert(name.to_string());
        Ok(())
    }

    fn stop(&self, name: &str) -> HostResult<()> {
        bump(&self.stop_calls);
        self.running.borrow_mut().remove(name);
        Ok(())
    }

    fn reset(&self, name: &str) -> HostResult<()> {
        bump(&self.reset_calls);
        if self.failing_reset.get() {
            return Err(HostError::CommandFailed {
                command: format!("systemctl reset-failed {name}"),
                stderr: "Failed to reset failed state".to_string(),
            });
        }
        Ok(())
    }
}

impl Filesystem for FakeHost {
    fn metadata(&self, path: &Path) -> HostResult<Option<FileMeta>> {
        bump(&self.probe_calls);
        self.denied(path)?;
        Ok(self.entries.borrow().get(path).map(|e| e.meta))
    }

    fn read(&self, path: &Path) -> HostResult<Option<Vec<u8>>> {
        bump(&self.probe_calls);
        self.denied(path)?;
        Ok(self.entries.borrow().get(path).and_then(|e| e.content.clone()))
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> HostResult<()> {
        bump(&self.write_calls);
        let mut entries = self.entries.borrow_mut();
        let meta = entries.get(path).map_or(
            FileMeta {
                uid: 0,
                gid: 0,
                mode: 0o644,
                is_dir: false,
            },
            |e| e.meta,
        );
        entries.insert(
            path.to_path_buf(),
            Entry {
                content: Some(content.to_vec()),
                meta,
            },
        );
        Ok(())
    }

    fn set_owner(&self, path: &Path, owner: ResolvedOwner) -> HostResult<()> {
        bump(&self.owner_calls);
        if self.ignore_permission_changes.get() {
            return Ok(());
        }
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(path).ok_or_else(|| HostError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        entry.meta.uid = owner.uid;
        if let Some(gid) = owner.gid {
            entry.meta.gid = gid;
        }
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> HostResult<()> {
        bump(&self.mode_calls);
        if self.ignore_permission_changes.get() {
            return Ok(());
        }
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(path).ok_or_else(|| HostError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        entry.meta.mode = mode;
        Ok(())
    }

    fn copy_preserving(&self, from: &Path, to: &Path) -> HostResult<()> {
        bump(&self.copy_calls);
        if self.failing_copies.get() {
            return Err(HostError::Io {
                path: to.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::StorageFull),
            });
        }
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(to) {
            return Err(HostError::Io {
                path: to.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            });
        }
        let entry = entries.get(from).cloned().ok_or_else(|| HostError::Io {
            path: from.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        entries.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> HostResult<bool> {
        bump(&self.remove_calls);
        Ok(self.entries.borrow_mut().remove(path).is_some())
    }

    fn walk(&self, root: &Path) -> HostResult<Vec<(PathBuf, FileMeta)>> {
        bump(&self.probe_calls);
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(p, _)| p.starts_with(root))
            .map(|(p, e)| (p.clone(), e.meta))
            .collect())
    }

    fn resolve_owner(&self, owner: &Ownership) -> HostResult<ResolvedOwner> {
        let lookup = |name: &str| -> HostResult<u32> {
            match name {
                "root" | "0" => Ok(0),
                "alice" | "1000" => Ok(1000),
                other => Err(HostError::UnknownOwner {
                    name: other.to_string(),
                }),
            }
        };
        Ok(ResolvedOwner {
            uid: lookup(&owner.user)?,
            gid: owner.group.as_deref().map(lookup).transpose()?,
        })
    }
}

impl PolicyChecker for FakeHost {
    fn check(&self, target: &Path, _candidate: &[u8]) -> HostResult<Verdict> {
        bump(&self.check_calls);
        Ok(self
            .verdicts
            .borrow()
            .get(target)
            .cloned()
            .unwrap_or(Verdict::Pass))
    }
}

impl MountInspector for FakeHost {
    fn flags_for(&self, _path: &Path) -> HostResult<MountFlags> {
        Ok(self.mount.borrow().clone())
    }
}
