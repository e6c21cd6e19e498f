//! Classifier Capability
//!
//! Defines the interface the analysis pipeline uses to talk to whatever
//! pretrained model backs content detection. Keeping the model behind this
//! trait means a different checkpoint, or a remote inference endpoint, can
//! be swapped in without touching sampling or aggregation logic.

use anyhow::Result;

/// The top-scoring class for a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// An image classifier that scores batches of fixed-size RGB images.
///
/// Implementations hold the loaded model for their whole lifetime and are
/// shared read-only across callers; a backend that is not reentrant must
/// guard its state internally (e.g. with a `Mutex`).
pub trait Classifier: Send + Sync {
    /// Edge length, in pixels, of the square RGB input the model expects.
    fn input_size(&self) -> u32;

    /// Scores a batch of images in a single model invocation.
    ///
    /// Each image must be exactly `input_size() * input_size() * 3` bytes of
    /// interleaved RGB. Returns one prediction per input image, in input
    /// order. The pipeline never calls this with an empty batch.
    fn classify(&self, batch: &[Vec<u8>]) -> Result<Vec<Prediction>>;
}
