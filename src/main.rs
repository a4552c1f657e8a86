mod cli;
mod commands;
mod config;
mod paths;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
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
        config: cli.config,
    };

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Check(args) => {
            commands::check::run(&ctx, args.target.as_deref(), false, None, args.json)
        }
        Command::Apply(args) => {
            commands::check::run(&ctx, args.target.as_deref(), true, args.jobs, args.json)
        }
        Command::Run(args) => commands::run::run(&ctx, args).await,
        Command::Diff(args) => commands::diff::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "steward", &mut io::stdout());
            Ok(())
        }
    }
}
