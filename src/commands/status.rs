use anyhow::Result;
use colored::Colorize;
use reconcile::probe;
use std::path::Path;

use crate::Context;
use crate::ui;

/// Probe every action and print whether it is in the desired state.
/// Nothing is mutated and no report is written.
pub fn run(ctx: &Context, manifest: &Path) -> Result<()> {
    let plan = super::load_plan(manifest)?;
    let timeout = super::command_timeout(None, &plan);
    let local = super::detect_host(&plan, timeout);
    let host = local.host();

    ui::header(&format!("Status of {}", plan.path.display()));

    let mut in_sync = 0;
    let mut differing = 0;
    let mut errors = 0;
    for action in &plan.actions {
        let result = probe::inspect(&host, action);
        let (symbol, detail) = match &result.error {
            Some(error) => {
                errors += 1;
                ("✗".red(), error.red().to_string())
            }
            None if result.matches => {
                in_sync += 1;
                if ctx.quiet {
                    continue;
                }
                ("✓".green(), result.details.dimmed().to_string())
            }
            None => {
                differing += 1;
                ("●".yellow(), result.details.clone())
            }
        };
        println!(
            "  {symbol} {} {} {}",
            action.id.bold(),
            format!("[{} {}]", action.kind(), action.target).dimmed(),
            detail
        );
    }

    println!();
    ui::kv("In sync", &in_sync.to_string());
    ui::kv("Differs", &differing.to_string());
    if errors > 0 {
        ui::kv("Probe errors", &errors.to_string());
    }
    Ok(())
}
