//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use compendium::ops::staleness::DEFAULT_SCAN_DEPTH;

/// compendium - keep an R compendium's code, DESCRIPTION and renv.lock in agreement
#[derive(Parser)]
#[command(name = "compendium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print only errors and the final verdict
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: String,

    /// Output format for messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    /// Never contact the package registry
    #[arg(long, global = true)]
    pub offline: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', long = "project", global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile code, DESCRIPTION and renv.lock
    Check(CheckArgs),

    /// Generate a Dockerfile for the project
    Dockerfile(DockerfileArgs),

    /// Print the OS packages the project's R packages need
    Sysdeps(SysdepsArgs),

    /// Write a version stamp into a generated file
    Stamp(StampArgs),

    /// Report generated files written by an older compendium
    Staleness(StalenessArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Update DESCRIPTION and renv.lock to fix critical issues
    #[arg(long)]
    pub fix: bool,

    /// Apply fixes without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Report and exit non-zero on critical issues without offering to fix them
    #[arg(long)]
    pub fail_on_issues: bool,

    /// Also scan tests/, vignettes/, inst/ and the other configured directories
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct DockerfileArgs {
    /// Base image (defaults to rocker/r-ver matching renv.lock)
    #[arg(long, value_name = "IMAGE")]
    pub base_image: Option<String>,

    /// Output path (defaults to ./Dockerfile)
    #[arg(short, long, value_name = "PATH", conflicts_with = "stdout")]
    pub output: Option<PathBuf>,

    /// Print the Dockerfile instead of writing it
    #[arg(long)]
    pub stdout: bool,
}

#[derive(Args)]
pub struct SysdepsArgs {}

#[derive(Args)]
pub struct StampArgs {
    /// File to stamp
    pub file: PathBuf,

    /// Artifact name: Dockerfile, Makefile, .Rprofile, docker-compose.yml, workflow
    #[arg(short, long)]
    pub artifact: String,

    /// Version to stamp (defaults to this compendium's version)
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Args)]
pub struct StalenessArgs {
    /// Scan every project below DIR instead of the current one
    #[arg(long, value_name = "DIR")]
    pub scan: Option<PathBuf>,

    /// Maximum directory depth of the scan
    #[arg(long, default_value_t = DEFAULT_SCAN_DEPTH)]
    pub depth: usize,

    /// Compare against this version instead of compendium's own
    #[arg(long)]
    pub current: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
