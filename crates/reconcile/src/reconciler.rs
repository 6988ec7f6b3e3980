//! Reconciler: drives each action through probe, validate, mutate and re-probe
//!
//! Actions are processed once, in declared order. Per-action errors end up
//! in that action's outcome; nothing here returns an error to the caller.

use crate::backup::BackupStore;
use crate::context::{Host, RunObserver};
use crate::mutator::{self, content_diff};
use crate::probe;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::types::{ActionOutcome, Desired, ProbeResult, ResourceAction, RunMeta, Status, Verdict};
use crate::validator;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const SPECIAL_BITS: u32 = 0o6000;

/// Run-wide switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Probe and validate only; report the intended change as SKIPPED
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Probing,
    Validating,
    Mutating,
    ProbingAfter,
    Done(Status),
}

/// Per-action phase tracker, logs every transition
struct Tracker<'a> {
    id: &'a str,
    phase: Phase,
}

impl<'a> Tracker<'a> {
    fn new(id: &'a str) -> Self {
        Self {
            id,
            phase: Phase::Pending,
        }
    }

    fn to(&mut self, next: Phase) {
        log::debug!("{}: {:?} -> {:?}", self.id, self.phase, next);
        self.phase = next;
    }
}

pub struct Reconciler<'a> {
    host: Host<'a>,
    options: ReconcileOptions,
    backups: BackupStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(host: Host<'a>, options: ReconcileOptions, backup_dir: &Path, run_id: &str) -> Self {
        Self {
            host,
            options,
            backups: BackupStore::new(backup_dir, run_id),
        }
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Reconcile `actions` in order and return the finished report.
    ///
    /// `cancel` is checked between actions only; a mutation in flight
    /// always runs to completion.
    pub fn run(
        &mut self,
        actions: &[ResourceAction],
        mut meta: RunMeta,
        cancel: &AtomicBool,
        observer: &mut dyn RunObserver,
    ) -> RunReport {
        let total = actions.len();
        log::info!(
            "Run {} on {}: {total} action(s){}",
            meta.run_id,
            meta.host,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut statuses: HashMap<String, Status> = HashMap::new();
        let mut outcomes = Vec::with_capacity(total);

        for (index, action) in actions.iter().enumerate() {
            let outcome = if cancel.load(Ordering::SeqCst) {
                log::debug!("{}: Pending -> Done(Skipped), run cancelled", action.id);
                ActionOutcome::new(action, Status::Skipped, "run cancelled")
            } else {
                observer.on_action_start(index, total, action);
                self.reconcile(action, &statuses)
            };

            statuses.insert(action.id.clone(), outcome.status);
            observer.on_action_complete(&outcome);
            outcomes.push(outcome);
        }

        meta.finished_at = Some(Utc::now());
        RunReport::new(meta, outcomes)
    }

    fn reconcile(&mut self, action: &ResourceAction, statuses: &HashMap<String, Status>) -> ActionOutcome {
        let mut tracker = Tracker::new(&action.id);

        if let Some(reason) = self.blocked_by(action, statuses) {
            tracker.to(Phase::Done(Status::SkippedDep));
            return ActionOutcome::new(action, Status::SkippedDep, reason);
        }

        tracker.to(Phase::Probing);
        let before = probe::inspect(&self.host, action);

        let mut outcome = ActionOutcome::new(action, Status::Ok, "");
        let (status, message) = self.decide(action, &before, &mut tracker, &mut outcome);
        outcome.probe_before = Some(before);
        outcome.status = status;
        outcome.message = message;

        tracker.to(Phase::Done(status));
        outcome
    }

    fn decide(
        &mut self,
        action: &ResourceAction,
        before: &ProbeResult,
        tracker: &mut Tracker<'_>,
        outcome: &mut ActionOutcome,
    ) -> (Status, String) {
        if let Some(err) = &before.error {
            return (Status::Failed, format!("probe failed: {err}"));
        }

        if before.matches {
            if let Some(warning) = self.constraint(action, true) {
                return (Status::Warned, warning);
            }
            return (Status::Ok, format!("already satisfied ({})", before.details));
        }

        if let Some(warning) = self.read_only_mount(action) {
            return (Status::Warned, warning);
        }

        if action.sensitive {
            tracker.to(Phase::Validating);
            if let Verdict::Fail { reason } = validator::validate(&self.host, action) {
                return (
                    Status::Warned,
                    format!("validation failed, target left untouched: {reason}"),
                );
            }
        }

        if self.options.dry_run {
            let intent = mutator::describe(action, before);
            self.log_intent(action, &intent);
            return (Status::Skipped, format!("dry run: {intent}"));
        }

        if needs_backup(action) {
            match self.backups.snapshot(self.host.fs, &action.path()) {
                Ok(path) => outcome.backup_path = path,
                Err(e) if action.sensitive => {
                    return (
                        Status::Failed,
                        format!("backup failed, target not modified: {}", e.actionable()),
                    );
                }
                Err(e) => log::warn!("{}: backup failed, continuing: {}", action.id, e.actionable()),
            }
        }

        tracker.to(Phase::Mutating);
        let applied = match mutator::apply(&self.host, action, &self.options.retry) {
            Ok(applied) => applied,
            Err(e) => {
                outcome.recovery_used = !e.recovery.is_empty();
                return (Status::Failed, with_recovery(e.reason, &e.recovery));
            }
        };
        outcome.recovery_used = !applied.recovery.is_empty();

        tracker.to(Phase::ProbingAfter);
        let after = probe::inspect(&self.host, action);
        let landed = after.matches;
        let after_error = after.error.clone();
        let after_details = after.details.clone();
        outcome.probe_after = Some(after);

        if let Some(err) = after_error {
            return (
                Status::Failed,
                format!("{}, but re-probe failed: {err}", applied.note),
            );
        }
        if let Some(warning) = self.constraint(action, landed) {
            return (Status::Warned, warning);
        }
        if !landed {
            return (
                Status::Failed,
                format!("{}, but the change did not land ({after_details})", applied.note),
            );
        }

        (Status::Ok, with_recovery(applied.note, &applied.recovery))
    }

    fn blocked_by(&self, action: &ResourceAction, statuses: &HashMap<String, Status>) -> Option<String> {
        for required in &action.requires {
            match statuses.get(required) {
                Some(status) if status.satisfies_dependents() => {}
                // A dry run skips everything; dependents are still previewed
                Some(Status::Skipped) if self.options.dry_run => {}
                Some(status) => return Some(format!("requires {required} ({status})")),
                None => return Some(format!("requires {required}, which has not run")),
            }
        }
        None
    }

    /// Environmental constraints this tool cannot fix
    fn constraint(&self, action: &ResourceAction, landed: bool) -> Option<String> {
        let special = match &action.desired {
            Desired::FileOwnerMode { mode, .. } => mode & SPECIAL_BITS != 0,
            Desired::DirectoryOwnerMode {
                dir_mode,
                file_mode,
                ..
            } => [*dir_mode, *file_mode]
                .into_iter()
                .flatten()
                .any(|m| m & SPECIAL_BITS != 0),
            _ => return None,
        };

        let flags = match self.host.mounts.flags_for(&action.path()) {
            Ok(flags) => flags,
            Err(e) => {
                log::debug!("{}: cannot inspect mount: {e}", action.id);
                return None;
            }
        };

        if !landed && flags.maps_permissions() {
            return Some(format!(
                "{} is on a {} mount ({}) that ignores unix owner/mode changes; move it to a native filesystem",
                action.target,
                flags.fs_type,
                flags.mount_point.display()
            ));
        }
        if special && flags.nosuid {
            return Some(format!(
                "{} is on a nosuid mount ({}); setuid/setgid bits have no effect, remount without nosuid",
                action.target,
                flags.mount_point.display()
            ));
        }
        None
    }

    fn read_only_mount(&self, action: &ResourceAction) -> Option<String> {
        if matches!(
            action.desired,
            Desired::PackageInstalled | Desired::ServiceRunning { .. }
        ) {
            return None;
        }
        let flags = self.host.mounts.flags_for(&action.path()).ok()?;
        flags.read_only.then(|| {
            format!(
                "{} is on a read-only mount ({}); remount read-write to apply",
                action.target,
                flags.mount_point.display()
            )
        })
    }

    fn log_intent(&self, action: &ResourceAction, intent: &str) {
        log::info!("{}: {intent}", action.id);
        if let Desired::FileContent { content } = &action.desired
            && let Ok(current) = self.host.fs.read(&action.path())
        {
            let diff = content_diff(current.as_deref().unwrap_or_default(), content);
            log::debug!("{}: content diff\n{diff}", action.id);
        }
    }
}

/// File content is always snapshotted; ownership only for sensitive targets
fn needs_backup(action: &ResourceAction) -> bool {
    match action.desired {
        Desired::FileContent { .. } => true,
        Desired::FileOwnerMode { .. } => action.sensitive,
        _ => false,
    }
}

fn with_recovery(message: String, recovery: &[String]) -> String {
    if recovery.is_empty() {
        message
    } else {
        format!("{message} (recovery used: {})", recovery.join("; "))
    }
}
