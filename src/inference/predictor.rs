//! Single-image prediction against a frozen artifact.

use std::path::Path;
use std::time::Instant;

use burn::prelude::*;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{resolve, ComputeBackend, CpuBackend, ResolvedBackend};
use crate::dataset::batcher::LesionBatcher;
use crate::dataset::labels::LesionClass;
use crate::dataset::preprocess::{input_len, load_image, preprocess_image_at};
use crate::model::classifier::LesionClassifier;
use crate::training::checkpoint::{load_checkpoint, read_metadata};
use crate::utils::error::{DermError, Result};
use crate::IMAGE_SIZE;

/// What the inference entrypoints print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Diagnostic code of the arg-max class
    pub predicted_class: String,
    /// Softmax probability of that class
    pub confidence: f32,
}

/// Map a probability vector in label-encoding order to a prediction.
pub fn prediction_from_probabilities(probabilities: &[f32]) -> Result<Prediction> {
    let (index, &confidence) = probabilities
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| DermError::Inference("empty probability vector".to_string()))?;

    let class = LesionClass::from_index(index)
        .ok_or_else(|| DermError::Inference(format!("class index {} outside the label encoding", index)))?;

    Ok(Prediction {
        predicted_class: class.code().to_string(),
        confidence,
    })
}

/// Loaded model plus the device it runs on
pub struct Predictor<B: Backend> {
    model: LesionClassifier<B>,
    device: B::Device,
    batcher: LesionBatcher,
    image_size: usize,
}

impl<B: Backend> Predictor<B> {
    /// Load the artifact at `path` (stem or `.mpk`) with full validation.
    ///
    /// Images are resized to the side recorded in the sidecar.
    pub fn load(path: &Path, device: &B::Device) -> Result<Self> {
        let model = load_checkpoint::<B>(path, device)?;
        let image_size = read_metadata(path)?.map(|m| m.image_size).unwrap_or(IMAGE_SIZE);
        Ok(Self::from_model(model, device).with_image_size(image_size))
    }

    pub fn from_model(model: LesionClassifier<B>, device: &B::Device) -> Self {
        Self {
            model,
            device: device.clone(),
            batcher: LesionBatcher::new(),
            image_size: IMAGE_SIZE,
        }
    }

    pub fn with_image_size(mut self, image_size: usize) -> Self {
        self.image_size = image_size;
        self.batcher = LesionBatcher::with_image_size(image_size);
        self
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Softmax over classes for one preprocessed image
    pub fn probabilities(&self, input: Vec<f32>) -> Result<Vec<f32>> {
        let expected = input_len(self.image_size);
        if input.len() != expected {
            return Err(DermError::Inference(format!(
                "expected {} input values, got {}",
                expected,
                input.len()
            )));
        }

        let images = self.batcher.images::<B>(vec![input], &self.device);
        self.model
            .forward_softmax(images)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| DermError::Inference(format!("cannot read probabilities: {:?}", e)))
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();
        let probabilities = self.probabilities(preprocess_image_at(image, self.image_size))?;
        let prediction = prediction_from_probabilities(&probabilities)?;
        debug!(
            "Predicted {} ({:.4}) in {:.2} ms",
            prediction.predicted_class,
            prediction.confidence,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(prediction)
    }

    pub fn predict_path(&self, path: &Path) -> Result<Prediction> {
        self.predict_image(&load_image(path)?)
    }
}

/// Load `model_path` on the requested backend and classify `image_path`.
pub fn predict(model_path: &Path, image_path: &Path, backend: ComputeBackend) -> Result<Prediction> {
    match resolve(backend) {
        ResolvedBackend::Cpu => {
            Predictor::<CpuBackend>::load(model_path, &Default::default())?.predict_path(image_path)
        }
        #[cfg(feature = "cuda")]
        ResolvedBackend::Gpu => Predictor::<crate::backend::GpuBackend>::load(model_path, &Default::default())?
            .predict_path(image_path),
    }
}

/// [`predict`] rendered as the single-line JSON object printed by the CLI
pub fn predict_json(model_path: &Path, image_path: &Path, backend: ComputeBackend) -> Result<String> {
    let prediction = predict(model_path, image_path, backend)?;
    Ok(serde_json::to_string(&prediction)?)
}
