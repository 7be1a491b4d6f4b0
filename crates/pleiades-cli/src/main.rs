mod catalog;
mod commands;
mod config;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pleiades", about = "Astronomical source extraction and photometry")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract sources from an image and write a text catalog
    Detect(commands::detect::DetectArgs),
    /// Report the background mesh of an image
    Background(commands::background::BackgroundArgs),
    /// Generate a synthetic star field for testing
    Synth(commands::synth::SynthArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Detect(args) => commands::detect::run(args),
        Commands::Background(args) => commands::background::run(args),
        Commands::Synth(args) => commands::synth::run(args),
    }
}
