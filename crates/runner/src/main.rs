//! Command-line entry point for program search.

use anyhow::Result;
use clap::Parser;
use progsearch_scheduler::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
