//! Content Analysis Pipeline
//!
//! Drives sampling, batch classification, and aggregation to completion for
//! one video file. The full video is always scanned; there is no early exit
//! on the first detection, no retry, and no partial report.

use anyhow::Error;
use log::info;
use std::path::Path;
use thiserror::Error as ThisError;

use crate::aggregator::{AnalysisReport, DetectionAggregator};
use crate::batch_classifier::BatchClassifier;
use crate::classifier::Classifier;
use crate::frame_sampler::FrameSampler;

/// Tuning knobs recognized by the pipeline. Defaults mirror the service
/// configuration this tool replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
    /// Stride, in frames, between frames submitted for classification.
    pub sample_interval: u32,
    /// Maximum number of frames per classifier invocation.
    pub batch_size: usize,
    /// A frame is flagged only when its top class scores above this.
    pub confidence_threshold: f32,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            sample_interval: 15,
            batch_size: 32,
            confidence_threshold: 0.85,
        }
    }
}

/// The two fatal ways an analysis can end.
#[derive(Debug, ThisError)]
pub enum AnalyzeError {
    /// The video could not be opened or decoded at all; no frames were
    /// processed.
    #[error("unable to open video source: {0:#}")]
    SourceUnavailable(Error),
    /// The classifier failed on some batch; the whole request fails rather
    /// than silently skipping the batch.
    #[error("classification failed: {0:#}")]
    ClassificationFailure(Error),
}

/// Analyzes one video file and returns the finalized report.
///
/// `is_inappropriate` decides which class labels count as objectionable;
/// the classifier itself only names the top class per frame.
pub fn analyze(
    classifier: &dyn Classifier,
    is_inappropriate: &dyn Fn(&str) -> bool,
    path: &Path,
    options: &AnalyzeOptions,
) -> Result<AnalysisReport, AnalyzeError> {
    analyze_with_progress(classifier, is_inappropriate, path, options, |_| {})
}

/// Same as [`analyze`], reporting the index of each sampled frame to
/// `progress` as the stream advances.
pub fn analyze_with_progress(
    classifier: &dyn Classifier,
    is_inappropriate: &dyn Fn(&str) -> bool,
    path: &Path,
    options: &AnalyzeOptions,
    mut progress: impl FnMut(u64),
) -> Result<AnalysisReport, AnalyzeError> {
    let sampler = FrameSampler::open(path, options.sample_interval)
        .map_err(AnalyzeError::SourceUnavailable)?;

    let mut aggregator = DetectionAggregator::new();
    let mut batcher = BatchClassifier::new(
        classifier,
        is_inappropriate,
        options.batch_size,
        options.confidence_threshold,
    );

    // The sampler releases its decode handle when `run` returns, on success
    // and on error alike. Errors surfacing from `run` originate in the
    // classifier closure; decode problems truncate the stream instead.
    let stats = sampler
        .run(|frame| {
            progress(frame.index);
            batcher.push(frame, &mut aggregator)
        })
        .map_err(AnalyzeError::ClassificationFailure)?;
    batcher
        .finish(&mut aggregator)
        .map_err(AnalyzeError::ClassificationFailure)?;

    let report = aggregator.finish(stats.total_frames);
    info!(
        "Analyzed {:?}: {} frames decoded, {} classified, {} flagged",
        path,
        report.total_frames,
        report.processed_frames,
        report.inappropriate_frames.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use crate::classifier::Prediction;
    use std::path::PathBuf;

    struct PanickyClassifier;

    impl Classifier for PanickyClassifier {
        fn input_size(&self) -> u32 {
            224
        }

        fn classify(&self, _batch: &[Vec<u8>]) -> anyhow::Result<Vec<Prediction>> {
            bail!("classifier must not run when the source cannot be opened");
        }
    }

    #[test]
    fn defaults_match_service_configuration() {
        let options = AnalyzeOptions::default();
        assert_eq!(options.sample_interval, 15);
        assert_eq!(options.batch_size, 32);
        assert!((options.confidence_threshold - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn unreadable_source_fails_before_any_classification() {
        let path = PathBuf::from("/nonexistent/upload.mp4");
        let result = analyze(
            &PanickyClassifier,
            &|_| true,
            &path,
            &AnalyzeOptions::default(),
        );
        match result {
            Err(AnalyzeError::SourceUnavailable(_)) => {}
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
