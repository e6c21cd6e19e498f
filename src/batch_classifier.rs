//! Batch Classification Module
//!
//! Buffers sampled frames into fixed-size batches, normalizes each frame to
//! the classifier's expected input, and invokes the classifier once per
//! batch. Batching is the one performance-relevant choice in the pipeline:
//! a single forward pass over 32 frames amortizes the model-invocation
//! overhead that would otherwise dominate.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use log::debug;

use crate::aggregator::DetectionAggregator;
use crate::classifier::{Classifier, Prediction};
use crate::frame_sampler::Frame;

/// A sampled frame already resized to the classifier's input dimensions.
/// The full-resolution image is dropped as soon as the frame is buffered.
struct PendingFrame {
    index: u64,
    timestamp_secs: f64,
    pixels: Vec<u8>,
}

/// Groups sampled frames and runs them through the classifier.
///
/// Each batch's results are index-aligned with its inputs; a frame whose top
/// class clears the confidence threshold and is marked inappropriate by the
/// label predicate becomes a detection, every other frame records `None`.
pub struct BatchClassifier<'a> {
    classifier: &'a dyn Classifier,
    is_inappropriate: &'a dyn Fn(&str) -> bool,
    batch_size: usize,
    confidence_threshold: f32,
    pending: Vec<PendingFrame>,
}

impl<'a> BatchClassifier<'a> {
    pub fn new(
        classifier: &'a dyn Classifier,
        is_inappropriate: &'a dyn Fn(&str) -> bool,
        batch_size: usize,
        confidence_threshold: f32,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            classifier,
            is_inappropriate,
            batch_size,
            confidence_threshold,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Buffers one sampled frame, flushing a full batch through the
    /// classifier when the buffer reaches capacity.
    pub fn push(&mut self, frame: Frame, sink: &mut DetectionAggregator) -> Result<()> {
        let edge = self.classifier.input_size();
        let resized = imageops::resize(&frame.image, edge, edge, FilterType::Triangle);
        self.pending.push(PendingFrame {
            index: frame.index,
            timestamp_secs: frame.timestamp_secs,
            pixels: resized.into_raw(),
        });
        if self.pending.len() >= self.batch_size {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Classifies the trailing partial batch, if any. Must be called once
    /// after the sampling stream is exhausted.
    pub fn finish(mut self, sink: &mut DetectionAggregator) -> Result<()> {
        self.flush(sink)
    }

    fn flush(&mut self, sink: &mut DetectionAggregator) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        // Move the pixel buffers out rather than copying a full batch per
        // invocation; only the index/timestamp pairs are kept for zipping.
        let mut positions = Vec::with_capacity(self.pending.len());
        let mut batch = Vec::with_capacity(self.pending.len());
        for frame in self.pending.drain(..) {
            positions.push((frame.index, frame.timestamp_secs));
            batch.push(frame.pixels);
        }

        let predictions = self.classifier.classify(&batch)?;
        if predictions.len() != positions.len() {
            return Err(anyhow!(
                "Classifier returned {} results for a batch of {}",
                predictions.len(),
                positions.len()
            ));
        }
        debug!("Classified batch of {} frames", positions.len());

        for ((index, timestamp_secs), prediction) in positions.into_iter().zip(predictions) {
            let detection = self.accept(prediction);
            sink.record(index, timestamp_secs, detection);
        }
        Ok(())
    }

    /// Threshold and label gate for one frame's top prediction.
    fn accept(&self, prediction: Prediction) -> Option<Prediction> {
        if prediction.confidence > self.confidence_threshold
            && (self.is_inappropriate)(&prediction.label)
        {
            Some(prediction)
        } else {
            None
        }
    }
}
