//! # Hostkit
//!
//! Adapters that implement the `reconcile` capability traits against the
//! live Linux host.
//!
//! | Capability | Adapter | Backed by |
//! |---|---|---|
//! | `PackageManager` | [`SystemPackages`] | apt/dpkg, dnf/rpm, pacman, zypper |
//! | `ServiceManager` | [`SystemServices`] | `systemctl`, SysV `service` |
//! | `Filesystem` | [`LocalFs`] | `std::fs`, `tempfile`, `walkdir`, `/etc/passwd` |
//! | `PolicyChecker` | [`CommandChecker`] | `visudo`, `sh -n`, per-action commands |
//! | `MountInspector` | [`ProcMounts`] | `/proc/self/mounts` |
//!
//! Every external command goes through [`CommandRunner`] and its timeout.

pub mod fs;
pub mod host;
pub mod mount;
pub mod package;
pub mod policy;
pub mod runner;
pub mod service;
pub mod users;

pub use fs::LocalFs;
pub use host::{hostname, is_root};
pub use mount::ProcMounts;
pub use package::{PackageBackend, SystemPackages};
pub use policy::CommandChecker;
pub use runner::{CommandOutput, CommandRunner, DEFAULT_TIMEOUT};
pub use service::{ServiceBackend, SystemServices};
pub use users::UserDb;

use reconcile::Host;

/// The live host: one adapter per capability
pub struct LocalHost {
    pub packages: SystemPackages,
    pub services: SystemServices,
    pub fs: LocalFs,
    pub checker: CommandChecker,
    pub mounts: ProcMounts,
}

impl LocalHost {
    /// Detect the package and service managers, sharing one command runner.
    pub fn detect(runner: CommandRunner) -> Self {
        Self {
            packages: SystemPackages::detect(runner.clone()),
            services: SystemServices::detect(runner.clone()),
            fs: LocalFs::default(),
            checker: CommandChecker::new(runner),
            mounts: ProcMounts::default(),
        }
    }

    /// Register per-target checker commands
    pub fn with_checkers(mut self, overrides: impl IntoIterator<Item = (std::path::PathBuf, Vec<String>)>) -> Self {
        for (target, command) in overrides {
            self.checker = self.checker.with_override(target, command);
        }
        self
    }

    /// Borrow the adapters as a capability set
    pub fn host(&self) -> Host<'_> {
        Host {
            packages: &self.packages,
            services: &self.services,
            fs: &self.fs,
            checker: &self.checker,
            mounts: &self.mounts,
        }
    }
}
