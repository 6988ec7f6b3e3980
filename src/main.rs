mod cli;
mod commands;
mod paths;
mod progress;
mod schema;
mod signal;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Nothing failed
const EXIT_OK: u8 = 0;
/// At least one action FAILED
const EXIT_FAILED: u8 = 1;
/// Invalid manifest or a fatal precondition; nothing was attempted
const EXIT_FATAL: u8 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Status(args) => commands::status::run(&ctx, &args.manifest).map(|()| true),
        Command::Check(args) => commands::check::run(&ctx, &args.manifest).map(|()| true),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::from(EXIT_OK),
        Ok(false) => ExitCode::from(EXIT_FAILED),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if ctx.verbose > 0 {
                log::debug!("{e:?}");
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}
