use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use reconcile::mutator::content_diff;
use reconcile::{
    Desired, Filesystem, NoProgress, ReconcileOptions, Reconciler, RetryPolicy, RunMeta,
    RunObserver, RunReport, Status,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::paths;
use crate::progress::TerminalProgress;
use crate::schema::Plan;
use crate::signal;
use crate::ui;

/// Reconcile the host against a manifest.
///
/// Returns whether the run finished without a FAILED action. Errors are
/// fatal preconditions: nothing was attempted.
pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<bool> {
    let plan = super::load_plan(&args.manifest)?;

    // 1. Preconditions
    let is_root = hostkit::is_root();
    if !is_root {
        if !args.dry_run {
            bail!(
                "converge apply must run as root (effective uid is {}); use --dry-run to preview",
                hostkit::host::effective_uid()
            );
        }
        ui::warn("Not running as root: probes may be incomplete");
    }

    let report_dir = resolve_dir(
        args.report_dir.as_deref(),
        plan.settings.report_dir.as_deref(),
        || paths::reports_dir(is_root),
    )?;
    let backup_dir = resolve_dir(
        args.backup_dir.as_deref(),
        plan.settings.backup_dir.as_deref(),
        || paths::backups_dir(is_root),
    )?;
    ensure_writable(&report_dir)?;

    let timeout = super::command_timeout(args.timeout, &plan);
    let retry = plan
        .settings
        .retry_delay_secs
        .map_or_else(RetryPolicy::default, |secs| {
            RetryPolicy::default().with_delay(Duration::from_secs(secs))
        });

    log::debug!(
        "Reports in {}, backups in {}, command timeout {}s",
        report_dir.display(),
        backup_dir.display(),
        timeout.as_secs()
    );

    // 2. Confirm
    if !args.json && !ctx.quiet {
        ui::header(&format!(
            "{} {}",
            if args.dry_run { "Previewing" } else { "Applying" },
            plan.path.display()
        ));
        ui::kv("Actions", &plan.actions.len().to_string());
        ui::kv("Backups", &backup_dir.display().to_string());
        println!();
    }
    if !args.dry_run && !args.yes && std::io::stdin().is_terminal() && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(true);
    }

    // 3. Run
    let local = super::detect_host(&plan, timeout);
    let meta = RunMeta::new(&hostkit::hostname(), args.dry_run);
    let options = ReconcileOptions {
        dry_run: args.dry_run,
        retry,
    };
    let cancel = signal::install();
    let mut reconciler = Reconciler::new(local.host(), options, &backup_dir, &meta.run_id);

    let mut observer: Box<dyn RunObserver> = if args.json {
        Box::new(NoProgress)
    } else {
        Box::new(TerminalProgress::new(ctx.quiet))
    };
    let report = reconciler.run(&plan.actions, meta, cancel, observer.as_mut());
    drop(observer);

    // 4. Report
    let saved = report.persist_or_warn(&report_dir);
    if args.json {
        println!("{}", report.to_json().context("Could not serialize report")?);
        return Ok(report.is_success());
    }

    if args.dry_run && !ctx.quiet {
        print_diffs(&plan, &report, &local.fs);
    }
    if !reconciler.backups().taken().is_empty() {
        ui::kv("Backups", &reconciler.backups().root().display().to_string());
    }
    ui::summary(&report.summary());
    if let Some(path) = saved {
        println!();
        ui::dim(&format!("Report: {}", path.display()));
    }

    Ok(report.is_success())
}

/// Flag, then manifest setting, then the state-dir default
fn resolve_dir(
    flag: Option<&Path>,
    setting: Option<&str>,
    default: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = setting {
        return paths::expand_strict(dir);
    }
    default()
}

/// The report directory must exist (or be creatable) and accept new files
fn ensure_writable(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create report directory {}", dir.display()))?;
    tempfile::Builder::new()
        .prefix(".converge-write-test-")
        .tempfile_in(dir)
        .with_context(|| format!("Report directory {} is not writable", dir.display()))?;
    Ok(())
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes to this host?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Line diffs for file contents a dry run would have written
fn print_diffs(plan: &Plan, report: &RunReport, fs: &dyn Filesystem) {
    for (action, outcome) in plan.actions.iter().zip(&report.outcomes) {
        let Desired::FileContent { content } = &action.desired else {
            continue;
        };
        if outcome.status != Status::Skipped {
            continue;
        }
        let current = match fs.read(&action.path()) {
            Ok(current) => current.unwrap_or_default(),
            Err(e) => {
                log::debug!("{}: no diff, {e}", action.id);
                continue;
            }
        };

        ui::header(&format!("{} ({})", action.id, action.target));
        for line in content_diff(&current, content).lines() {
            println!("{}", colorize_diff_line(line));
        }
    }
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}
