//! Core types for single-host reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of resource an action manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PackageInstalled,
    FileContent,
    FileOwnerMode,
    ServiceRunning,
    DirectoryOwnerMode,
}

impl ActionKind {
    /// Stable snake_case name, as used in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageInstalled => "package_installed",
            Self::FileContent => "file_content",
            Self::FileOwnerMode => "file_owner_mode",
            Self::ServiceRunning => "service_running",
            Self::DirectoryOwnerMode => "directory_owner_mode",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner specification: `user` or `user:group`, names or numeric ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub user: String,
    pub group: Option<String>,
}

impl Ownership {
    pub fn new(user: &str, group: Option<&str>) -> Self {
        Self {
            user: user.to_string(),
            group: group.map(str::to_string),
        }
    }
}

impl FromStr for Ownership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, group) = match s.split_once(':') {
            Some((u, g)) => (u.trim(), Some(g.trim())),
            None => (s.trim(), None),
        };
        if user.is_empty() {
            return Err(format!("owner '{s}' has an empty user"));
        }
        if group.is_some_and(str::is_empty) {
            return Err(format!("owner '{s}' has an empty group"));
        }
        Ok(Self::new(user, group))
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(g) => write!(f, "{}:{g}", self.user),
            None => f.write_str(&self.user),
        }
    }
}

/// Owner resolved to numeric ids by the filesystem capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOwner {
    pub uid: u32,
    pub gid: Option<u32>,
}

/// Kind-specific desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired {
    /// Package present in the host package database
    PackageInstalled,
    /// File holds exactly these bytes
    FileContent { content: Vec<u8> },
    /// File has this owner and permission bits
    FileOwnerMode { owner: Ownership, mode: u32 },
    /// Service is (or is not) running
    ServiceRunning {
        running: bool,
        /// Lock/pid artifacts removed by the bounded recovery step
        stale_files: Vec<PathBuf>,
    },
    /// Every entry under the directory has this owner and mode
    DirectoryOwnerMode {
        owner: Ownership,
        dir_mode: Option<u32>,
        file_mode: Option<u32>,
    },
}

/// A declarative unit of desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAction {
    /// Stable identifier, unique within a run
    pub id: String,
    /// Package name, file path or service name depending on the kind
    pub target: String,
    pub desired: Desired,
    /// Ids that must reach OK/WARNED before this action is attempted
    pub requires: Vec<String>,
    /// Validation and backup are mandatory before mutation
    pub sensitive: bool,
}

impl ResourceAction {
    pub fn new(id: &str, target: &str, desired: Desired) -> Self {
        Self {
            id: id.to_string(),
            target: target.to_string(),
            desired,
            requires: Vec::new(),
            sensitive: false,
        }
    }

    pub fn requires(mut self, ids: &[&str]) -> Self {
        self.requires = ids.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn kind(&self) -> ActionKind {
        match self.desired {
            Desired::PackageInstalled => ActionKind::PackageInstalled,
            Desired::FileContent { .. } => ActionKind::FileContent,
            Desired::FileOwnerMode { .. } => ActionKind::FileOwnerMode,
            Desired::ServiceRunning { .. } => ActionKind::ServiceRunning,
            Desired::DirectoryOwnerMode { .. } => ActionKind::DirectoryOwnerMode,
        }
    }

    /// Target as a filesystem path (meaningful for file and directory kinds)
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.target)
    }
}

/// Outcome of inspecting one action's target. Never mutates host state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub matches: bool,
    pub details: String,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn matching(details: impl Into<String>) -> Self {
        Self {
            matches: true,
            details: details.into(),
            error: None,
        }
    }

    pub fn differing(details: impl Into<String>) -> Self {
        Self {
            matches: false,
            details: details.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            matches: false,
            details: "probe failed".to_string(),
            error: Some(error),
        }
    }
}

/// Result of a pre-commit validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Terminal status of one action in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    /// Dry run or cancelled run: nothing attempted
    Skipped,
    /// A required action did not reach OK/WARNED
    SkippedDep,
    Warned,
    Failed,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Skipped => "SKIPPED",
            Self::SkippedDep => "SKIPPED_DEP",
            Self::Warned => "WARNED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether dependents may proceed after this status
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Ok | Self::Warned)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of reconciling one action in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub id: String,
    pub kind: ActionKind,
    pub target: String,
    pub status: Status,
    pub probe_before: Option<ProbeResult>,
    pub probe_after: Option<ProbeResult>,
    pub backup_path: Option<PathBuf>,
    pub message: String,
    /// The bounded recovery step ran during this action
    #[serde(default)]
    pub recovery_used: bool,
}

impl ActionOutcome {
    pub(crate) fn new(action: &ResourceAction, status: Status, message: impl Into<String>) -> Self {
        Self {
            id: action.id.clone(),
            kind: action.kind(),
            target: action.target.clone(),
            status,
            probe_before: None,
            probe_after: None,
            backup_path: None,
            message: message.into(),
            recovery_used: false,
        }
    }

    /// Terminal line as printed after each action
    pub fn status_line(&self) -> String {
        match self.status {
            Status::Ok => "OK".to_string(),
            Status::Skipped | Status::SkippedDep => format!("SKIPPED: {}", self.message),
            Status::Warned => format!("WARNED: {}", self.message),
            Status::Failed => format!("FAILED: {}", self.message),
        }
    }
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Timestamp-derived id, also names the backup directory and report file
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Host identity (hostname)
    pub host: String,
    pub dry_run: bool,
}

impl RunMeta {
    pub fn new(host: &str, dry_run: bool) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: run_id_for(started_at),
            started_at,
            finished_at: None,
            host: host.to_string(),
            dry_run,
        }
    }
}

/// Format a run id from its start time
pub fn run_id_for(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format permission bits the way `chmod` takes them
pub fn fmt_mode(mode: u32) -> String {
    format!("{mode:04o}")
}

/// Parse an octal mode string such as `"0440"` or `"755"`
pub fn parse_mode(s: &str) -> Result<u32, String> {
    let trimmed = s.trim().trim_start_matches("0o");
    let mode =
        u32::from_str_radix(trimmed, 8).map_err(|_| format!("'{s}' is not an octal mode"))?;
    if mode > 0o7777 {
        return Err(format!("mode '{s}' exceeds 7777"));
    }
    Ok(mode)
}
