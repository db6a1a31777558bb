//! Evaluation over a labeled image source.
//!
//! Traverses the source in index order without augmentation, so the result
//! only depends on the model and the data.

use burn::data::dataloader::batcher::Batcher;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::batcher::{LesionBatch, LesionBatcher};
use crate::dataset::labels::{class_names, NUM_CLASSES};
use crate::dataset::resolver::PathProbe;
use crate::dataset::source::LesionImageSource;
use crate::model::classifier::LesionClassifier;
use crate::utils::error::{DermError, Result};
use crate::utils::metrics::{ConfusionMatrix, Metrics, RunningAverage};

/// Result of one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Mean of per-batch mean cross-entropy
    pub avg_loss: f64,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub metrics: Metrics,
    /// Rendered per-class table
    pub report: String,
}

impl EvaluationReport {
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Evaluate `model` on every sample of `source`.
pub fn evaluate<B: Backend, P: PathProbe>(
    model: &LesionClassifier<B>,
    source: &LesionImageSource<P>,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationReport> {
    if source.is_empty() {
        return Err(DermError::Dataset("evaluation set is empty".to_string()));
    }
    if batch_size == 0 {
        return Err(DermError::Config("batch size must be at least 1".to_string()));
    }

    let batcher = LesionBatcher::with_image_size(source.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices: Vec<usize> = (0..source.len()).collect();

    let mut loss = RunningAverage::new();
    let mut predictions = Vec::with_capacity(source.len());
    let mut ground_truth = Vec::with_capacity(source.len());

    for chunk in indices.chunks(batch_size) {
        let items = source.items(chunk, None)?;
        ground_truth.extend(items.iter().map(|item| item.label));

        let batch: LesionBatch<B> = batcher.batch(items, device);
        let logits = model.forward(batch.images);

        let batch_loss = loss_fn.forward(logits.clone(), batch.targets);
        loss.add(batch_loss.into_scalar().elem::<f64>());

        let batch_predictions: Vec<i64> = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| DermError::Model(format!("cannot read predictions: {:?}", e)))?;
        predictions.extend(batch_predictions.into_iter().map(|p| p as usize));
    }

    debug!("Evaluated {} samples in {} batches", predictions.len(), loss.count());

    let metrics = Metrics::from_predictions(&predictions, &ground_truth, NUM_CLASSES);
    let report = metrics.classification_report(&class_names());

    Ok(EvaluationReport {
        avg_loss: loss.average(),
        accuracy: metrics.accuracy,
        confusion_matrix: metrics.confusion_matrix.clone(),
        metrics,
        report,
    })
}
