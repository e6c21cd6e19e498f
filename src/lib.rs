//! VideoScreener - Core Library
//!
//! This file contains the primary logic for the application, wiring the
//! frame sampler, batch classifier, and detection aggregator into a single
//! content-safety analysis of one video file.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;

// Define modules for different functionalities
pub mod aggregator;
pub mod batch_classifier;
pub mod classifier;
pub mod frame_sampler;
pub mod nsfw;
pub mod pipeline;

pub use aggregator::{AnalysisReport, FlaggedFrame};
pub use pipeline::{AnalyzeError, AnalyzeOptions};

/// Application configuration structure.
#[derive(Debug)]
pub struct Config {
    pub input_file: PathBuf,
    /// Where to write the JSON report, if anywhere.
    pub report_path: Option<PathBuf>,
    pub sample_interval: u32,
    pub batch_size: usize,
    pub confidence_threshold: f32,
}

/// Loads the bundled NSFW detector and analyzes the configured video.
pub fn run(config: Config) -> Result<AnalysisReport> {
    info!("Initializing analysis with config: {:?}", config);

    let detector = nsfw::NsfwDetector::new()
        .context("Failed to load the content classification model")?;
    run_with_classifier(&detector, &nsfw::is_inappropriate_label, config)
}

/// Analyzes the configured video with the given classifier and label
/// predicate, reporting progress and writing the JSON report if requested.
pub fn run_with_classifier(
    classifier: &dyn classifier::Classifier,
    is_inappropriate: &dyn Fn(&str) -> bool,
    config: Config,
) -> Result<AnalysisReport> {
    let options = AnalyzeOptions {
        sample_interval: config.sample_interval,
        batch_size: config.batch_size,
        confidence_threshold: config.confidence_threshold,
    };

    info!("Starting video analysis for: {:?}", config.input_file);
    let pb = match frame_sampler::estimate_frame_count(&config.input_file) {
        Ok(count) if count > 0 => {
            let bar = ProgressBar::new(count);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} Screening frames [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) [{elapsed_precise}<{eta}]")
                    .unwrap()
                    .progress_chars("##-"),
            );
            bar
        }
        _ => {
            warn!("Could not determine total frame count. Using spinner as fallback.");
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} Screening frames... [{elapsed_precise}] frame {pos}")
                    .unwrap(),
            );
            bar
        }
    };
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let report = pipeline::analyze_with_progress(
        classifier,
        is_inappropriate,
        &config.input_file,
        &options,
        |frame_index| pb.set_position(frame_index),
    )?;
    finish_progress(&pb, &report);

    if report.is_appropriate() {
        info!(
            "Verdict: appropriate ({} frames decoded, {} classified)",
            report.total_frames, report.processed_frames
        );
    } else {
        warn!(
            "Verdict: inappropriate ({} of {} classified frames flagged)",
            report.inappropriate_frames.len(),
            report.processed_frames
        );
    }

    if let Some(report_path) = &config.report_path {
        fs::write(report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report to {:?}", report_path))?;
        info!("Wrote analysis report to {:?}", report_path);
    }

    Ok(report)
}

/// Closes the progress bar at the authoritative decoded-frame count. The
/// bar position tracks sampled frame indices while the stream runs, so
/// without this it would stop short of the estimated length.
fn finish_progress(pb: &ProgressBar, report: &AnalysisReport) {
    pb.set_position(report.total_frames);
    pb.finish_with_message(format!(
        "Screened {} of {} frames",
        report.processed_frames, report.total_frames
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_closes_at_decoded_total() {
        let report = AnalysisReport {
            total_frames: 100,
            processed_frames: 7,
            inappropriate_frames: Vec::new(),
        };
        let pb = ProgressBar::new(100);
        pb.set_position(90); // last sampled index for interval 15
        finish_progress(&pb, &report);
        assert_eq!(pb.position(), 100);
        assert!(pb.is_finished());
    }
}
