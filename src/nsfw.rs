//! NSFW Detection Model
//!
//! A concrete [`Classifier`] backed by the LukeJacob2023/nsfw-image-detector
//! ViT checkpoint, run locally through candle. Weights are downloaded once
//! via the Hugging Face hub cache and loaded at construction; the instance
//! is then reused for every analysis.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::vit;
use hf_hub::{api::sync::Api, Repo, RepoType};
use log::info;
use std::sync::Mutex;

use crate::classifier::{Classifier, Prediction};

const MODEL_REPO: &str = "LukeJacob2023/nsfw-image-detector";
const IMAGE_SIZE: usize = 224;

/// Class labels in the order the checkpoint emits them.
const LABELS: [&str; 5] = ["drawings", "hentai", "neutral", "porn", "sexy"];

/// Which of the model's classes count as inappropriate content. Drawings
/// and neutral are safe.
pub fn is_inappropriate_label(label: &str) -> bool {
    matches!(label, "hentai" | "porn" | "sexy")
}

/// 5-class ViT NSFW detector.
///
/// The model forward pass is not reentrant, so it is guarded by a mutex;
/// the detector itself can be shared freely across threads.
pub struct NsfwDetector {
    model: Mutex<vit::Model>,
    device: Device,
}

impl NsfwDetector {
    pub fn new() -> Result<Self> {
        #[cfg(feature = "metal")]
        let device = Device::new_metal(0).unwrap_or(Device::Cpu);
        #[cfg(not(feature = "metal"))]
        let device = Device::Cpu;

        info!("Loading NSFW detection model on {:?}", device);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(MODEL_REPO.to_string(), RepoType::Model));

        let model_path = repo.get("model.safetensors")?;
        let config_path = repo.get("config.json")?;

        let config: vit::Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, &device)? };
        let model = vit::Model::new(&config, LABELS.len(), vb)?;

        info!("NSFW model loaded");

        Ok(Self {
            model: Mutex::new(model),
            device,
        })
    }
}

impl Classifier for NsfwDetector {
    fn input_size(&self) -> u32 {
        IMAGE_SIZE as u32
    }

    fn classify(&self, batch: &[Vec<u8>]) -> Result<Vec<Prediction>> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        for (i, image) in batch.iter().enumerate() {
            if image.len() != IMAGE_SIZE * IMAGE_SIZE * 3 {
                return Err(anyhow!(
                    "Image {} expected {}x{}x3 RGB, got {} bytes",
                    i,
                    IMAGE_SIZE,
                    IMAGE_SIZE,
                    image.len()
                ));
            }
        }

        let input = preprocess_batch(batch, &self.device)?;
        let model = self.model.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let logits = model.forward(&input)?;

        // Softmax over the class axis; shape is (batch, 5)
        let probs = candle_nn::ops::softmax(&logits, 1)?;
        let probs_vec: Vec<f32> = probs.flatten_all()?.to_vec1()?;

        let predictions = probs_vec
            .chunks(LABELS.len())
            .map(top_prediction)
            .collect();
        Ok(predictions)
    }
}

/// Packs interleaved RGB8 images into the (batch, channel, height, width)
/// f32 tensor the checkpoint expects. This model normalizes with mean 0.5
/// and std 0.5 on every channel.
fn preprocess_batch(batch: &[Vec<u8>], device: &Device) -> Result<Tensor> {
    let mean = 0.5;
    let std = 0.5;
    let batch_size = batch.len();

    let mut data = vec![0f32; batch_size * 3 * IMAGE_SIZE * IMAGE_SIZE];

    for (batch_idx, rgb) in batch.iter().enumerate() {
        let offset = batch_idx * 3 * IMAGE_SIZE * IMAGE_SIZE;
        for i in 0..(IMAGE_SIZE * IMAGE_SIZE) {
            let r = rgb[i * 3] as f32 / 255.0;
            let g = rgb[i * 3 + 1] as f32 / 255.0;
            let b = rgb[i * 3 + 2] as f32 / 255.0;

            data[offset + i] = (r - mean) / std;
            data[offset + IMAGE_SIZE * IMAGE_SIZE + i] = (g - mean) / std;
            data[offset + 2 * IMAGE_SIZE * IMAGE_SIZE + i] = (b - mean) / std;
        }
    }

    let tensor = Tensor::from_vec(data, (batch_size, 3, IMAGE_SIZE, IMAGE_SIZE), device)?;
    Ok(tensor)
}

fn top_prediction(class_probs: &[f32]) -> Prediction {
    let (best_idx, best_prob) = class_probs
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (idx, prob)| {
            if prob > best.1 { (idx, prob) } else { best }
        });
    Prediction::new(LABELS[best_idx], best_prob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_predicate_matches_model_classes() {
        assert!(is_inappropriate_label("hentai"));
        assert!(is_inappropriate_label("porn"));
        assert!(is_inappropriate_label("sexy"));
        assert!(!is_inappropriate_label("neutral"));
        assert!(!is_inappropriate_label("drawings"));
        assert!(!is_inappropriate_label("something-else"));
    }

    #[test]
    fn top_prediction_picks_highest_class() {
        let prediction = top_prediction(&[0.05, 0.1, 0.6, 0.2, 0.05]);
        assert_eq!(prediction.label, "neutral");
        assert!((prediction.confidence - 0.6).abs() < 1e-6);

        let prediction = top_prediction(&[0.01, 0.02, 0.03, 0.9, 0.04]);
        assert_eq!(prediction.label, "porn");
    }

    #[test]
    fn preprocess_builds_chw_tensor() {
        let white = vec![255u8; IMAGE_SIZE * IMAGE_SIZE * 3];
        let black = vec![0u8; IMAGE_SIZE * IMAGE_SIZE * 3];
        let tensor = preprocess_batch(&[white, black], &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[2, 3, IMAGE_SIZE, IMAGE_SIZE]);

        let values: Vec<f32> = tensor.flatten_all().unwrap().to_vec1().unwrap();
        // (1.0 - 0.5) / 0.5 = 1.0 for white, (0.0 - 0.5) / 0.5 = -1.0 for black
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[3 * IMAGE_SIZE * IMAGE_SIZE] + 1.0).abs() < 1e-6);
    }
}
