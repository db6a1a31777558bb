//! Train/validate loop.
//!
//! Each epoch is a shuffled, augmented pass over the training split with Adam
//! on mean cross-entropy, followed by a full evaluation of the validation
//! split. The best checkpoint is rewritten whenever validation accuracy
//! strictly exceeds the running best (starting at 0.0); the final checkpoint
//! is written once after the last epoch.

use std::path::PathBuf;
use std::time::Instant;

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::batcher::{LesionBatch, LesionBatcher};
use crate::dataset::labels::class_names;
use crate::dataset::source::LesionImageSource;
use crate::model::classifier::LesionClassifier;
use crate::training::checkpoint::CheckpointStore;
use crate::training::config::{TrainingConfig, CONFIG_FILE};
use crate::training::evaluator::{evaluate, EvaluationReport};
use crate::utils::error::{DermError, Result};
use crate::utils::format_duration;
use crate::utils::metrics::RunningAverage;

/// File name of the per-epoch history in the artifact directory
pub const HISTORY_FILE: &str = "history.json";

/// Tracks the best validation accuracy seen so far
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: f64,
    epoch: Option<usize>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch's accuracy. True when it strictly beats the best so far.
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        if accuracy > self.best {
            self.best = accuracy;
            self.epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.epoch
    }
}

/// Summary of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub saved_best: bool,
    pub duration_secs: f64,
}

/// Per-epoch history of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochSummary>,
    pub best_accuracy: f64,
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// What a finished run hands back
#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: LesionClassifier<B>,
    /// Class codes in index order
    pub classes: Vec<String>,
    pub history: TrainingHistory,
    pub last_report: EvaluationReport,
    pub best_checkpoint: Option<PathBuf>,
    pub final_checkpoint: PathBuf,
}

/// Run the full training loop described by `config`.
pub fn train<B: AutodiffBackend>(config: &TrainingConfig, device: &B::Device) -> Result<TrainingOutcome<B>> {
    config.validate()?;
    std::fs::create_dir_all(&config.artifact_dir)?;
    config.save(config.artifact_dir.join(CONFIG_FILE))?;

    let train_source = LesionImageSource::from_class_dirs(&config.train_dir())?
        .with_image_size(config.image_size)
        .with_augmentation(config.augmentation.clone());
    let val_source = LesionImageSource::from_class_dirs(&config.val_dir())?.with_image_size(config.image_size);

    if train_source.is_empty() {
        return Err(DermError::Dataset(format!(
            "no training images under {}",
            config.train_dir().display()
        )));
    }
    if val_source.is_empty() {
        return Err(DermError::Dataset(format!(
            "no validation images under {}",
            config.val_dir().display()
        )));
    }

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Training samples:   {}", train_source.len());
    println!("  Validation samples: {}", val_source.len());
    println!("  Epochs:             {}", config.num_epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Learning rate:      {}", config.learning_rate);
    println!("  Image size:         {}", config.image_size);
    println!("  Frozen backbone:    {}", config.model.freeze_backbone);
    match &config.model.pretrained_weights {
        Some(path) => println!("  Pretrained weights: {}", path.display()),
        None => {
            println!("  Pretrained weights: {}", "none (training from scratch)".yellow());
            warn!("no pretrained weights configured; the feature extractor starts from random initialisation");
        }
    }
    println!();

    let mut model = config.model.init::<B>(device)?;
    let mut optimizer = config.optimizer.init::<B, LesionClassifier<B>>();
    let store = CheckpointStore::new(&config.artifact_dir).with_image_size(config.image_size);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut tracker = BestTracker::new();
    let mut history = TrainingHistory::default();
    let mut last_report = None;

    for epoch in 1..=config.num_epochs {
        let started = Instant::now();

        let (trained, train_loss) = train_epoch(
            model,
            &mut optimizer,
            &train_source,
            config,
            &mut rng,
            epoch,
            device,
        )?;
        model = trained;

        let valid_model = model.valid();
        let valid_device = valid_model.head.weight.device();
        let report = evaluate(&valid_model, &val_source, config.batch_size, &valid_device)?;

        println!(
            "\nEpoch [{}/{}] | Train Loss: {:.4} | Val Loss: {:.4} | Val Acc: {:.4}",
            epoch, config.num_epochs, train_loss, report.avg_loss, report.accuracy
        );
        println!("Confusion Matrix:");
        print!("{}", report.confusion_matrix);
        println!("Classification Report:");
        print!("{}", report.report);
        println!("{}", "-".repeat(50));

        let saved_best = tracker.observe(epoch, report.accuracy);
        if saved_best {
            store.save_best(&valid_model, epoch, report.accuracy)?;
            println!(
                "{}",
                format!("Best model saved with Val Acc: {:.4}", report.accuracy).green()
            );
        }

        let duration = started.elapsed().as_secs_f64();
        info!(epoch, train_loss, val_loss = report.avg_loss, val_acc = report.accuracy, "epoch finished in {}", format_duration(duration));

        history.epochs.push(EpochSummary {
            epoch,
            train_loss,
            val_loss: report.avg_loss,
            val_accuracy: report.accuracy,
            saved_best,
            duration_secs: duration,
        });
        last_report = Some(report);
    }

    let last_report = last_report.ok_or_else(|| DermError::Training("no epoch was run".to_string()))?;
    let final_checkpoint = store.save_final(&model.valid(), config.num_epochs, Some(last_report.accuracy))?;
    println!("Final model saved.");

    history.best_accuracy = tracker.best();
    history.best_epoch = tracker.best_epoch();
    history.save(&config.artifact_dir.join(HISTORY_FILE))?;

    let best_checkpoint = tracker
        .best_epoch()
        .map(|_| crate::training::checkpoint::record_path(&store.best_stem()));

    Ok(TrainingOutcome {
        model,
        classes: class_names(),
        history,
        last_report,
        best_checkpoint,
        final_checkpoint,
    })
}

/// One shuffled pass over the training source. Returns the mean of per-batch losses.
fn train_epoch<B, O>(
    mut model: LesionClassifier<B>,
    optimizer: &mut O,
    source: &LesionImageSource,
    config: &TrainingConfig,
    rng: &mut ChaCha8Rng,
    epoch: usize,
    device: &B::Device,
) -> Result<(LesionClassifier<B>, f64)>
where
    B: AutodiffBackend,
    O: Optimizer<LesionClassifier<B>, B>,
{
    let batcher = LesionBatcher::with_image_size(source.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut indices: Vec<usize> = (0..source.len()).collect();
    indices.shuffle(rng);
    let num_batches = indices.len().div_ceil(config.batch_size);

    let progress = ProgressBar::new(num_batches as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("  {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress.set_prefix(format!("Epoch {}/{}", epoch, config.num_epochs));

    let mut loss_avg = RunningAverage::new();
    for chunk in indices.chunks(config.batch_size) {
        let items = source.items(chunk, Some(&mut *rng))?;
        let batch: LesionBatch<B> = batcher.batch(items, device);

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits, batch.targets);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        loss_avg.add(loss_value);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(config.learning_rate, model, grads);

        progress.set_message(format!("loss = {:.4}", loss_value));
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok((model, loss_avg.average()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_checkpoint_policy() {
        let mut tracker = BestTracker::new();
        let accuracies = [0.70, 0.65, 0.80, 0.75];

        let saved: Vec<usize> = accuracies
            .iter()
            .enumerate()
            .filter_map(|(i, &acc)| tracker.observe(i + 1, acc).then_some(i + 1))
            .collect();

        assert_eq!(saved, vec![1, 3]);
        assert_eq!(tracker.best(), 0.80);
        assert_eq!(tracker.best_epoch(), Some(3));
    }

    #[test]
    fn test_ties_do_not_replace_best() {
        let mut tracker = BestTracker::new();
        assert!(tracker.observe(1, 0.5));
        assert!(!tracker.observe(2, 0.5));
        assert_eq!(tracker.best_epoch(), Some(1));
    }

    #[test]
    fn test_zero_accuracy_never_saves() {
        let mut tracker = BestTracker::new();
        assert!(!tracker.observe(1, 0.0));
        assert_eq!(tracker.best_epoch(), None);
    }

    #[test]
    fn test_best_and_final_checkpoints_follow_accuracy() {
        use crate::model::classifier::ClassifierConfig;
        use crate::training::checkpoint::{load_checkpoint, read_metadata};
        use burn::tensor::{Distribution, Tensor};
        use burn_ndarray::NdArray;

        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let store = CheckpointStore::new(dir.path());
        let mut tracker = BestTracker::new();
        let x = Tensor::<NdArray, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);

        // One distinct model per epoch, standing in for the weights after that epoch
        let models: Vec<LesionClassifier<NdArray>> = (0..4)
            .map(|_| ClassifierConfig::new().init::<NdArray>(&device).unwrap())
            .collect();
        let outputs: Vec<Vec<f32>> = models
            .iter()
            .map(|m| m.forward(x.clone()).into_data().to_vec().unwrap())
            .collect();
        assert_ne!(outputs[2], outputs[3]);

        let accuracies = [0.70, 0.65, 0.80, 0.75];
        let mut best_epochs = Vec::new();
        for (i, (model, &acc)) in models.iter().zip(accuracies.iter()).enumerate() {
            let epoch = i + 1;
            if tracker.observe(epoch, acc) {
                store.save_best(model, epoch, acc).unwrap();
                best_epochs.push(read_metadata(&store.best_stem()).unwrap().unwrap().epoch);
            }
        }
        store.save_final(&models[3], 4, Some(0.75)).unwrap();

        assert_eq!(best_epochs, vec![Some(1), Some(3)]);

        let best_meta = read_metadata(&store.best_stem()).unwrap().unwrap();
        assert_eq!(best_meta.epoch, Some(3));
        assert_eq!(best_meta.validation_accuracy, Some(0.80));
        let best = load_checkpoint::<NdArray>(&store.best_stem(), &device).unwrap();
        let best_out: Vec<f32> = best.forward(x.clone()).into_data().to_vec().unwrap();
        assert_eq!(best_out, outputs[2]);

        let final_meta = read_metadata(&store.final_stem()).unwrap().unwrap();
        assert_eq!(final_meta.epoch, Some(4));
        let last = load_checkpoint::<NdArray>(&store.final_stem(), &device).unwrap();
        let last_out: Vec<f32> = last.forward(x).into_data().to_vec().unwrap();
        assert_eq!(last_out, outputs[3]);
    }

    #[test]
    fn test_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::with_dirs(dir.path().join("nope"), dir.path().join("out"));
        let device = Default::default();

        let result = train::<burn::backend::Autodiff<burn_ndarray::NdArray>>(&config, &device);
        assert!(matches!(result, Err(DermError::Dataset(_))));
    }
}
