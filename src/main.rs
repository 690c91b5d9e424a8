use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::ffi::OsString;

mod args;
mod config;
mod context;
mod env;
mod gitlab;
mod http;
mod logging;
mod tail;
mod trace;
mod ui;

use crate::args::CLIArgs;

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("GLT_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "glt", about = "Follow GitLab CI job logs", version = CLI_VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Trace a CI job log in real time
    #[command(after_help = "Examples:\n  glt trace             interactively select a job to trace\n  glt trace 224356863   trace job with id 224356863")]
    Trace(CLIArgs<trace::TraceArgs>),
    /// View and modify configuration
    Config(CLIArgs<config::ConfigArgs>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);
    logging::init(cli.verbose);

    match cli.command {
        Commands::Trace(cmd) => trace::run(cmd.base, cmd.args).await?,
        Commands::Config(cmd) => config::run(cmd.base, cmd.args)?,
    }

    Ok(())
}
