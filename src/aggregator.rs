//! Detection Aggregation Module
//!
//! Accumulates per-frame classification outcomes into the final analysis
//! report. Pure bookkeeping: no I/O, no side effects beyond its own state.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::Prediction;

/// One frame judged inappropriate, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedFrame {
    pub frame_number: u64,
    pub timestamp_secs: f64,
    pub confidence: f32,
}

/// Final outcome of analyzing one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Every frame decoded from the stream, sampled or not.
    pub total_frames: u64,
    /// Frames actually sent through the classifier.
    pub processed_frames: u64,
    /// Flagged frames in ascending frame order.
    pub inappropriate_frames: Vec<FlaggedFrame>,
}

impl AnalysisReport {
    /// The verdict: a video is appropriate if and only if no frame was
    /// flagged. A single flagged frame flips it, with no severity weighting.
    pub fn is_appropriate(&self) -> bool {
        self.inappropriate_frames.is_empty()
    }
}

/// Collects classification outcomes in arrival order.
///
/// Frames arrive in sampling order, which is monotonic in frame index, so
/// plain appends keep the flagged list sorted by frame number.
#[derive(Debug, Default)]
pub struct DetectionAggregator {
    processed_frames: u64,
    flagged: Vec<FlaggedFrame>,
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for one classified frame. `detection` is `None`
    /// when no significant class cleared the confidence threshold.
    pub fn record(&mut self, frame_number: u64, timestamp_secs: f64, detection: Option<Prediction>) {
        debug_assert!(
            self.flagged.last().map_or(true, |f| f.frame_number < frame_number),
            "frames must arrive in increasing index order"
        );
        self.processed_frames += 1;
        match detection {
            Some(prediction) => {
                warn!(
                    "Flagged frame {} at {:.2}s: {} ({:.1}%)",
                    frame_number,
                    timestamp_secs,
                    prediction.label,
                    prediction.confidence * 100.0
                );
                self.flagged.push(FlaggedFrame {
                    frame_number,
                    timestamp_secs,
                    confidence: prediction.confidence,
                });
            }
            None => debug!("Frame {} clean", frame_number),
        }
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }

    /// Finalizes the report. `total_frames` is the decoder's count of every
    /// frame in the stream, reported by the sampler once it is exhausted.
    pub fn finish(self, total_frames: u64) -> AnalysisReport {
        AnalysisReport {
            total_frames,
            processed_frames: self.processed_frames,
            inappropriate_frames: self.flagged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_is_appropriate() {
        let aggregator = DetectionAggregator::new();
        let report = aggregator.finish(0);
        assert_eq!(report.total_frames, 0);
        assert_eq!(report.processed_frames, 0);
        assert!(report.inappropriate_frames.is_empty());
        assert!(report.is_appropriate());
    }

    #[test]
    fn clean_frames_count_but_do_not_flag() {
        let mut aggregator = DetectionAggregator::new();
        aggregator.record(0, 0.0, None);
        aggregator.record(15, 0.5, None);
        let report = aggregator.finish(30);
        assert_eq!(report.processed_frames, 2);
        assert_eq!(report.total_frames, 30);
        assert!(report.is_appropriate());
    }

    #[test]
    fn single_detection_flips_verdict() {
        let mut aggregator = DetectionAggregator::new();
        aggregator.record(0, 0.0, None);
        aggregator.record(15, 0.5, Some(Prediction::new("porn", 0.9)));
        aggregator.record(30, 1.0, None);
        let report = aggregator.finish(31);
        assert!(!report.is_appropriate());
        assert_eq!(
            report.inappropriate_frames,
            vec![FlaggedFrame {
                frame_number: 15,
                timestamp_secs: 0.5,
                confidence: 0.9,
            }]
        );
    }

    #[test]
    fn flagged_frames_stay_in_frame_order() {
        let mut aggregator = DetectionAggregator::new();
        for index in [0u64, 15, 30, 45, 60] {
            aggregator.record(index, index as f64 / 30.0, Some(Prediction::new("sexy", 0.95)));
        }
        let report = aggregator.finish(75);
        let numbers: Vec<u64> = report
            .inappropriate_frames
            .iter()
            .map(|f| f.frame_number)
            .collect();
        assert_eq!(numbers, vec![0, 15, 30, 45, 60]);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn report_serializes_to_expected_shape() {
        let mut aggregator = DetectionAggregator::new();
        aggregator.record(45, 1.5, Some(Prediction::new("hentai", 0.875)));
        let report = aggregator.finish(100);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_frames"], 100);
        assert_eq!(json["processed_frames"], 1);
        assert_eq!(json["inappropriate_frames"][0]["frame_number"], 45);
    }
}
