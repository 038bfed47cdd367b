//! Revunk CLI: beat-synchronized video remixing from plain-text scripts.
//!
//! Usage:
//!   revunk export <SCRIPT>        Render a script to video
//!   revunk open <EXPORTED>        Recover the script behind an export
//!   revunk format <SCRIPT>        Align a script's export block
//!   revunk detect-grid <VIDEO>    Estimate tempo from a metronome grid
//!   revunk plan <SCRIPT>          Print the composition plan as JSON

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use revunk_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "revunk",
    about = "Beat-synchronized video remixing from plain-text scripts",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a script to video
    Export {
        /// Path to the script
        script: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output frame rate (defaults to the configured rate)
        #[arg(long)]
        fps: Option<u32>,

        /// Output format: mp4-h264|mp4-h265|webm
        #[arg(long)]
        format: Option<String>,
    },

    /// Recover the script behind an exported file
    Open {
        /// Path to the exported video
        exported: PathBuf,
    },

    /// Align the export block of a script
    Format {
        /// Path to the script
        script: PathBuf,

        /// Rewrite the file instead of printing to stdout
        #[arg(short = 'i', long)]
        in_place: bool,
    },

    /// Estimate tempo and anchors from a metronome grid in the video
    DetectGrid {
        /// Path to the video
        video: PathBuf,

        /// Grid region as fractions of the frame: x y w h
        #[arg(long, num_args = 4, value_names = ["X", "Y", "W", "H"])]
        grid: Option<Vec<f64>>,

        /// Write `<video>.auto.revunk.txt` next to the video
        #[arg(long)]
        emit_revunk: bool,
    },

    /// Print the composition plan for a script as JSON
    Plan {
        /// Path to the script
        script: PathBuf,

        /// Frame rate to plan at (defaults to the configured rate)
        #[arg(long)]
        fps: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    revunk_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            script,
            output,
            fps,
            format,
        } => commands::export::run(&config, script, output, fps, format).await,
        Commands::Open { exported } => commands::open::run(&config, exported),
        Commands::Format { script, in_place } => commands::format::run(script, in_place),
        Commands::DetectGrid {
            video,
            grid,
            emit_revunk,
        } => commands::detect_grid::run(video, grid, emit_revunk),
        Commands::Plan { script, fps } => commands::plan::run(&config, script, fps),
    }
}
