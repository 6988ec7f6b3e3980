//! # Reconcile
//!
//! Single-host, idempotent state reconciliation.
//!
//! An ordered list of [`ResourceAction`]s is driven toward its desired
//! state one action at a time:
//!
//! ```text
//! Pending -> Probing -> (SkippedDep | Validating | Mutating) -> ProbingAfter -> Ok | Warned | Failed
//! ```
//!
//! ## Core Concepts
//!
//! - **Probe**: read-only inspection; absence is a result, not an error
//! - **Validator**: checks candidate content before a sensitive commit
//! - **Backup**: snapshot once per run before a file is changed
//! - **Mutator**: one operation per action kind, with a dry-run description
//! - **Reconciler**: orders the above and records one outcome per action
//! - **Report**: human-readable and JSON rendering, persisted per run
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{Desired, NoProgress, ReconcileOptions, Reconciler, ResourceAction, RunMeta};
//! use std::sync::atomic::AtomicBool;
//!
//! let actions = vec![
//!     ResourceAction::new("xfce4", "xfce4", Desired::PackageInstalled),
//!     ResourceAction::new(
//!         "startwm",
//!         "/etc/xrdp/startwm.sh",
//!         Desired::FileContent { content: b"xfce4-session\n".to_vec() },
//!     )
//!     .sensitive(true)
//!     .requires(&["xfce4"]),
//! ];
//!
//! let meta = RunMeta::new("rdp-box", false);
//! let mut reconciler = Reconciler::new(host, ReconcileOptions::default(), backup_dir, &meta.run_id);
//! let report = reconciler.run(&actions, meta, &AtomicBool::new(false), &mut NoProgress);
//! println!("{}", report.render());
//! ```
//!
//! ## Capability Traits
//!
//! The reconciler only touches the host through:
//!
//! - [`PackageManager`]: package database
//! - [`ServiceManager`]: service state
//! - [`Filesystem`]: file content, ownership and modes
//! - [`PolicyChecker`]: syntax checks for policy-like files
//! - [`MountInspector`]: mount options of a path
//!
//! Each can be replaced by a fake, so the core is testable without a host.

pub mod backup;
pub mod context;
pub mod error;
pub mod mutator;
pub mod probe;
pub mod reconciler;
pub mod report;
pub mod retry;
pub mod types;
pub mod validator;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use backup::BackupStore;
pub use context::{
    FileMeta, Filesystem, Host, MountFlags, MountInspector, NoProgress, PackageManager,
    PolicyChecker, RunObserver, ServiceManager,
};
pub use error::{ErrorCategory, HostError, HostResult};
pub use reconciler::{ReconcileOptions, Reconciler};
pub use report::{RunReport, Summary};
pub use retry::{Attempted, RecoveryFailed, RetryPolicy, run_bounded};
pub use types::{
    ActionKind, ActionOutcome, Desired, Ownership, ProbeResult, ResolvedOwner, ResourceAction,
    RunMeta, Status, Verdict, fmt_mode, parse_mode, run_id_for,
};
