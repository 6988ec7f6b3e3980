use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, manifest: &Path) -> Result<()> {
    let plan = super::load_plan(manifest)?;

    if !ctx.quiet {
        ui::header(&format!("Manifest {}", plan.path.display()));
        for action in &plan.actions {
            let mut flags = Vec::new();
            if action.sensitive {
                flags.push("sensitive".yellow().to_string());
            }
            if !action.requires.is_empty() {
                flags.push(format!("requires {}", action.requires.join(", ")).dimmed().to_string());
            }
            println!(
                "  {} {} {} {}",
                action.id.bold(),
                action.kind().to_string().cyan(),
                action.target,
                flags.join(" ")
            );
        }
        println!();
    }

    ui::success(&format!("{} action(s), manifest is valid", plan.actions.len()));
    Ok(())
}
