//! Benchpack CLI - bring a ComfyUI installation in line with a package manifest.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::style;

/// Acquire the models, custom nodes and packages a benchmark manifest declares.
#[derive(Debug, Parser)]
#[command(name = "benchpack", version, about)]
pub struct Cli {
    /// Manifest file (JSON or YAML)
    pub manifest: PathBuf,

    /// ComfyUI installation directory
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Directory the package archive was unpacked into
    #[arg(long, value_name = "DIR")]
    pub bundle_root: Option<PathBuf>,

    /// Also write log lines to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Only acquire items marked as required
    #[arg(long)]
    pub required_only: bool,

    /// Re-acquire everything, even items already in place
    #[arg(long)]
    pub force: bool,

    /// Skip checksum verification after downloads
    #[arg(long)]
    pub no_verify: bool,

    /// Show what would be acquired without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Acquire one item at a time
    #[arg(long)]
    pub sequential: bool,

    /// Number of parallel workers
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Always start downloads from scratch
    #[arg(long)]
    pub no_resume: bool,

    /// Delete partial downloads and exit
    #[arg(long)]
    pub cleanup: bool,

    /// Python interpreter used for pip installs
    #[arg(long, value_name = "EXE")]
    pub python: Option<PathBuf>,

    /// Hugging Face access token (defaults to HF_TOKEN)
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
