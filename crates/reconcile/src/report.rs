//! Run report rendering and persistence

use crate::error::{HostError, HostResult};
use crate::types::{ActionOutcome, RunMeta, Status};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Ordered outcomes of one run plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub outcomes: Vec<ActionOutcome>,
}

/// Counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ok: usize,
    pub warned: usize,
    pub failed: usize,
    pub skipped: usize,
    pub skipped_dep: usize,
    pub failed_ids: Vec<String>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.ok + self.warned + self.failed + self.skipped + self.skipped_dep
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OK {}, WARNED {}, FAILED {}, SKIPPED {}, SKIPPED_DEP {}",
            self.ok, self.warned, self.failed, self.skipped, self.skipped_dep
        )
    }
}

impl RunReport {
    pub fn new(meta: RunMeta, outcomes: Vec<ActionOutcome>) -> Self {
        Self { meta, outcomes }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                Status::Ok => summary.ok += 1,
                Status::Warned => summary.warned += 1,
                Status::Failed => {
                    summary.failed += 1;
                    summary.failed_ids.push(outcome.id.clone());
                }
                Status::Skipped => summary.skipped += 1,
                Status::SkippedDep => summary.skipped_dep += 1,
            }
        }
        summary
    }

    /// True when no action reached FAILED
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status != Status::Failed)
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let meta = &self.meta;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "converge run {} on {}{}",
            meta.run_id,
            meta.host,
            if meta.dry_run { " (dry run)" } else { "" }
        );
        let _ = write!(out, "started {}", meta.started_at.to_rfc3339());
        if let Some(finished) = meta.finished_at {
            let _ = write!(out, ", finished {}", finished.to_rfc3339());
        }
        out.push_str("\n\n");

        for outcome in &self.outcomes {
            let _ = writeln!(
                out,
                "{} [{} {}]: {}",
                outcome.id,
                outcome.kind,
                outcome.target,
                outcome.status_line()
            );
            if let Some(backup) = &outcome.backup_path {
                let _ = writeln!(out, "    backup: {}", backup.display());
            }
        }

        let summary = self.summary();
        let _ = writeln!(out, "\nsummary: {summary}");
        if !summary.failed_ids.is_empty() {
            let _ = writeln!(out, "failed: {}", summary.failed_ids.join(", "));
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the rendered report under `dir`, never replacing an earlier one.
    pub fn persist(&self, dir: &Path) -> HostResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| HostError::io(dir, e))?;

        let base = format!("converge-{}", self.meta.run_id);
        let body = self.render();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{base}.log")
            } else {
                format!("{base}.{attempt}.log")
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())
                        .map_err(|e| HostError::io(&path, e))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(HostError::io(&path, e)),
            }
        }

        Err(HostError::io(
            dir.join(format!("{base}.log")),
            std::io::Error::from(ErrorKind::AlreadyExists),
        ))
    }

    /// Persist, logging a warning on failure; the run result stands either way
    pub fn persist_or_warn(&self, dir: &Path) -> Option<PathBuf> {
        match self.persist(dir) {
            Ok(path) => {
                log::info!("Report written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("Could not write run report: {}", e.actionable());
                None
            }
        }
    }
}
