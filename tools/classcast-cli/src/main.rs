//! ClassCast CLI: record lesson clips from the screen, camera, and microphone.
//!
//! Usage:
//!   classcast record [OPTIONS]   Record a clip (screen, audio, video, screen-and-video)
//!   classcast check              Check which capture sources are available
//!   classcast config [--init]    Show or initialize the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use classcast_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "classcast",
    about = "Screen, camera, and microphone recording for course content",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a clip
    Record {
        /// Capture mode: screen, audio, video, or screen-and-video
        #[arg(short, long, default_value = "screen")]
        mode: String,

        /// Output file (defaults to the recordings directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Use in-memory devices and encoder instead of GStreamer
        #[arg(long)]
        synthetic: bool,
    },

    /// Check capture capabilities
    Check,

    /// Print the effective configuration
    Config {
        /// Write the default configuration to the standard location
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    classcast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            mode,
            output,
            duration,
            synthetic,
        } => commands::record::run(config, mode, output, duration, synthetic).await,
        Commands::Check => commands::check::run(),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
