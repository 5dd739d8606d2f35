//! compendium CLI - dependency hygiene for R research compendia

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};
use compendium::util::{ColorChoice, GlobalContext, Shell};

/// Options shared by every command.
pub struct GlobalOptions {
    pub shell: Arc<Shell>,
    pub offline: bool,
    pub project: Option<PathBuf>,
}

impl GlobalOptions {
    /// Context rooted at `-C DIR` or the working directory.
    pub fn context(&self) -> Result<GlobalContext> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let cwd = match &self.project {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };
        let mut ctx = GlobalContext::with_cwd(cwd)?;
        ctx.set_offline(self.offline);
        Ok(ctx)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("compendium=debug")
    } else if cli.quiet || cli.message_format == MessageFormat::Json {
        EnvFilter::new("compendium=error")
    } else {
        EnvFilter::new("compendium=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let color: ColorChoice = cli.color.parse().map_err(anyhow::Error::msg)?;
    let shell = Shell::from_flags(
        cli.quiet,
        cli.verbose,
        color,
        cli.message_format == MessageFormat::Json,
    );
    let global_opts = GlobalOptions {
        shell: Arc::new(shell),
        offline: cli.offline,
        project: cli.project,
    };

    // Execute command
    match cli.command {
        Commands::Check(args) => commands::check::execute(args, &global_opts),
        Commands::Dockerfile(args) => commands::dockerfile::execute(args, &global_opts),
        Commands::Sysdeps(args) => commands::sysdeps::execute(args, &global_opts),
        Commands::Stamp(args) => commands::stamp::execute(args, &global_opts),
        Commands::Staleness(args) => commands::staleness::execute(args, &global_opts),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
