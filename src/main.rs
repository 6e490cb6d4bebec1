mod cli;
mod commands;
mod config;
mod engine;
mod host;
mod manifest;
mod progress;
mod recipe;
mod runner;
mod state;
mod templates;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
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

    match cli.command {
        Command::Apply(args) => commands::declarative::apply(&ctx, &args),
        Command::Diff(args) => {
            commands::declarative::diff(&ctx, args.target.as_deref(), &args.plan)
        }
        Command::Status(args) => {
            commands::declarative::status(&ctx, args.target.as_deref(), &args.plan)
        }
        Command::Report { json } => commands::report::run(&ctx, json),
        Command::Attributes { key, sources } => {
            commands::attributes::run(key.as_deref(), &sources)
        }
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "convergent", &mut io::stdout());
            Ok(())
        }
    }
}
