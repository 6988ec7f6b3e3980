use colored::{ColoredString, Colorize};
use reconcile::{ActionOutcome, Status, Summary};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Step prefix such as `[2/7]`
pub fn step_prefix(num: usize, total: usize) -> ColoredString {
    format!("[{num}/{total}]").blue().bold()
}

/// Colored symbol for a terminal status
pub fn status_symbol(status: Status) -> ColoredString {
    match status {
        Status::Ok => "✓".green(),
        Status::Warned => "⚠".yellow(),
        Status::Failed => "✗".red(),
        Status::Skipped | Status::SkippedDep => "⊘".dimmed(),
    }
}

/// One line per finished action: `✓ xfce4 OK`
pub fn outcome_line(outcome: &ActionOutcome) -> String {
    let line = outcome.status_line();
    let line = match outcome.status {
        Status::Ok => line.green(),
        Status::Warned => line.yellow(),
        Status::Failed => line.red(),
        Status::Skipped | Status::SkippedDep => line.dimmed(),
    };
    format!("{} {} {}", status_symbol(outcome.status), outcome.id.bold(), line)
}

/// Print the end-of-run summary block
pub fn summary(summary: &Summary) {
    header("Summary");
    let counts = [
        ("OK", summary.ok, Status::Ok),
        ("WARNED", summary.warned, Status::Warned),
        ("FAILED", summary.failed, Status::Failed),
        ("SKIPPED", summary.skipped, Status::Skipped),
        ("SKIPPED_DEP", summary.skipped_dep, Status::SkippedDep),
    ];
    for (label, count, status) in counts {
        if count > 0 {
            println!("  {} {label}: {count}", status_symbol(status));
        }
    }
    if !summary.failed_ids.is_empty() {
        println!();
        println!("  {} {}", "Failed:".red().bold(), summary.failed_ids.join(", "));
    }
}
