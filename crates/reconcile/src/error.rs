//! Error types for host capability calls.
//!
//! Errors are categorized so the reconciler can decide whether a failed
//! attempt is worth the single bounded retry, and so every WARNED/FAILED
//! outcome can carry a one-line piece of advice.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of host errors for retry logic and user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Filesystem I/O failed for a reason other than absence
    Io,
    /// An external command did not finish within its time budget
    Timeout,
    /// Network-related failure (mirror unreachable, DNS, TLS)
    Network,
    /// Package or unit unknown to the host
    NotFound,
    /// A database or lock is held by another process
    Locked,
    /// Permission denied
    Permission,
    /// User or group name does not resolve
    UnknownOwner,
    /// The host lacks the tool needed for the operation
    Unsupported,
    /// An external command exited non-zero
    Command,
}

impl ErrorCategory {
    /// Whether a failed attempt in this category is eligible for a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network | Self::Locked)
    }

    /// Actionable advice shown next to the failure reason.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Io => "check the path and the filesystem it lives on",
            Self::Timeout => "the operation hung; inspect it manually or raise --timeout",
            Self::Network => "check network connectivity and package mirrors",
            Self::NotFound => "verify the name in the manifest",
            Self::Locked => "another package manager or service run holds the lock; wait and retry",
            Self::Permission => "run as root",
            Self::UnknownOwner => "create the user/group first or fix the owner in the manifest",
            Self::Unsupported => "install the required tool on this host",
            Self::Command => "see the command output above",
        }
    }
}

/// Errors raised by host capabilities.
#[derive(Debug, Error)]
pub enum HostError {
    /// Filesystem error on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Command ran but exited non-zero
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Trimmed standard error
        stderr: String,
    },

    /// Command exceeded its time budget and was killed
    #[error("`{command}` timed out after {secs}s")]
    Timeout {
        /// Command line that hung
        command: String,
        /// Budget in seconds
        secs: u64,
    },

    /// Network error
    #[error("network error: {message}")]
    Network {
        /// Details from the failing tool
        message: String,
    },

    /// Package or service unknown
    #[error("not found: {name}")]
    NotFound {
        /// The unknown name
        name: String,
    },

    /// Lock held elsewhere
    #[error("locked: {message}")]
    Locked {
        /// Details from the failing tool
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// What was denied
        message: String,
    },

    /// Unknown user or group
    #[error("unknown user or group: {name}")]
    UnknownOwner {
        /// The name that did not resolve
        name: String,
    },

    /// Required tool missing
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl HostError {
    /// Build an I/O error, promoting `PermissionDenied` to its own category.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::Permission {
                message: format!("{}: {source}", path.display()),
            };
        }
        Self::Io { path, source }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } => ErrorCategory::Io,
            Self::CommandFailed { .. } => ErrorCategory::Command,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Network { .. } => ErrorCategory::Network,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Locked { .. } => ErrorCategory::Locked,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::UnknownOwner { .. } => ErrorCategory::UnknownOwner,
            Self::Unsupported(_) => ErrorCategory::Unsupported,
        }
    }

    /// Whether this error is eligible for the bounded retry.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// One-line reason with advice appended.
    pub fn actionable(&self) -> String {
        let text = self.to_string();
        let first_line = text.lines().next().unwrap_or_default().trim();
        format!("{first_line} ({})", self.category().advice())
    }
}

/// Result type for host capability calls.
pub type HostResult<T> = std::result::Result<T, HostError>;
