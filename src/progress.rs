//! Terminal progress for a reconciliation run.
//!
//! A spinner shows the action in flight; each finished action leaves a
//! status line behind.

use crate::ui;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ActionOutcome, ResourceAction, RunObserver};
use std::time::Duration;

pub struct TerminalProgress {
    spinner: Option<ProgressBar>,
    quiet: bool,
}

impl TerminalProgress {
    /// `quiet` keeps only non-OK lines
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: None,
            quiet,
        }
    }

    fn clear(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl RunObserver for TerminalProgress {
    fn on_action_start(&mut self, index: usize, total: usize, action: &ResourceAction) {
        self.clear();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(ui::step_prefix(index + 1, total).to_string());
        pb.set_message(format!("{} {}", action.kind(), action.target));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    fn on_action_complete(&mut self, outcome: &ActionOutcome) {
        self.clear();
        if self.quiet && outcome.status == reconcile::Status::Ok {
            return;
        }
        println!("{}", ui::outcome_line(outcome));
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.clear();
    }
}
