//! VideoScreener - Main Application Entrypoint
//!
//! This file is responsible for parsing command-line arguments, initializing
//! the application environment (like logging), and dispatching the core
//! analysis logic.

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use videoscreener::run;

/// A command-line tool that screens video files for inappropriate visual content.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input video file (e.g., upload.mp4)
    #[arg(short, long)]
    input: PathBuf,

    /// Analyze every Nth frame of the video
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..))]
    interval: u32,

    /// Number of frames classified per model invocation
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(1..))]
    batch_size: u32,

    /// Minimum confidence for a detection to flag a frame (0.0 to 1.0)
    #[arg(short, long, default_value_t = 0.85)]
    threshold: f32,

    /// Write the full JSON analysis report to this path
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting VideoScreener...");

    // 2. Validate input path
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        std::process::exit(1);
    }

    // 3. Create a configuration object from arguments
    let config = videoscreener::Config {
        input_file: args.input,
        report_path: args.report,
        sample_interval: args.interval,
        batch_size: args.batch_size as usize,
        confidence_threshold: args.threshold,
    };

    // 4. Run the analysis and map the verdict onto the exit code
    match run(config) {
        Ok(report) if report.is_appropriate() => {
            info!("Content approved: no inappropriate frames found.");
            std::process::exit(0);
        }
        Ok(report) => {
            warn!(
                "Content rejected: {} inappropriate frame(s) found.",
                report.inappropriate_frames.len()
            );
            std::process::exit(3);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            std::process::exit(2);
        }
    }
}
