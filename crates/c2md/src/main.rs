//! c2md CLI - Confluence export to Markdown converter.
//!
//! Provides commands for:
//! - `convert`: Convert an exported space (directory or ZIP) to Markdown
//! - `status`: Inspect the incremental conversion state
//! - `clean`: Remove generated output and state

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CleanArgs, ConvertArgs, StatusArgs};
use output::Output;

/// c2md - Confluence export to Markdown converter.
#[derive(Parser)]
#[command(name = "c2md", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Confluence space export to a Markdown tree.
    Convert(ConvertArgs),
    /// Show the conversion state of an output directory.
    Status(StatusArgs),
    /// Remove generated output and conversion state.
    Clean(CleanArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Convert(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Convert(args) => args.execute(),
        Commands::Status(args) => args.execute(),
        Commands::Clean(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
