//! dermai CLI
//!
//! Prepare the HAM10000 split, fine-tune the classifier, evaluate and freeze
//! checkpoints, and classify single images.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::config::Config;
use burn::optim::AdamConfig;
use burn::tensor::backend::{AutodiffBackend, Backend};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use dermai::backend::{resolve, ComputeBackend, CpuBackend, ResolvedBackend, TrainingBackend};
use dermai::dataset::labels::LesionClass;
use dermai::dataset::prepare::{prepare_dataset, PrepareConfig, TRAIN_DIR, VAL_DIR};
use dermai::dataset::source::LesionImageSource;
use dermai::dataset::split::SplitConfig;
use dermai::model::classifier::ClassifierConfig;
use dermai::training::checkpoint::{load_checkpoint, read_metadata, FROZEN_ARTIFACT};
use dermai::training::config::TrainingConfig;
use dermai::training::evaluator::evaluate;
use dermai::training::finalize::finalize;
use dermai::training::trainer::train;
use dermai::utils::format_duration;
use dermai::utils::logging::{init_logging, LogConfig};
use dermai::VALIDATION_FRACTION;

/// Dermatoscopic lesion classification with Burn
#[derive(Parser, Debug)]
#[command(name = "dermai")]
#[command(version)]
#[command(about = "Skin-lesion classification: prepare, train, evaluate, finalize, infer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a metadata table into train/ and val/ class directories
    Prepare {
        /// Metadata CSV with image_id and dx columns
        #[arg(short, long)]
        metadata: PathBuf,

        /// Image directory, searched in the order given (repeatable)
        #[arg(short, long = "image-dir", required = true)]
        image_dirs: Vec<PathBuf>,

        /// Root receiving train/ and val/
        #[arg(short, long, default_value = "data")]
        output_dir: PathBuf,

        /// Random seed for the split
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Do not write prepare_report.json
        #[arg(long, default_value = "false")]
        no_report: bool,
    },

    /// Fine-tune the classifier
    Train {
        /// Load the whole run configuration from a JSON file; other flags are ignored
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset root containing train/ and val/
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for checkpoints, config.json and history.json
        #[arg(short, long, default_value = "artifacts")]
        artifact_dir: PathBuf,

        /// Number of training epochs
        #[arg(short, long, default_value = "5")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// torchvision resnet18 state dict for the feature extractor
        #[arg(long, required_unless_present_any = ["from_scratch", "config"])]
        pretrained: Option<PathBuf>,

        /// Start the feature extractor from random weights instead of --pretrained
        #[arg(long, default_value = "false", conflicts_with = "pretrained")]
        from_scratch: bool,

        /// Only train the classification head
        #[arg(long, default_value = "false")]
        freeze_backbone: bool,

        /// Disable flip/rotation augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Random seed for shuffling and augmentation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Side length images are resized to
        #[arg(long, default_value_t = dermai::IMAGE_SIZE)]
        image_size: usize,

        #[arg(long, value_enum, default_value_t = ComputeBackend::Auto)]
        backend: ComputeBackend,
    },

    /// Evaluate a checkpoint on a class-directory dataset
    Evaluate {
        /// Checkpoint stem or .mpk file
        #[arg(short, long, default_value = "artifacts/best_model")]
        checkpoint: PathBuf,

        /// Directory with one subdirectory per class code
        #[arg(short, long, default_value = "data/val")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ComputeBackend::Auto)]
        backend: ComputeBackend,
    },

    /// Freeze the best checkpoint into the deployable artifact
    Finalize {
        /// Checkpoint to freeze
        #[arg(short, long, default_value = "artifacts/best_model")]
        best: PathBuf,

        /// Artifact stem
        #[arg(short, long, default_value = FROZEN_ARTIFACT)]
        output: PathBuf,
    },

    /// Classify one image and print the prediction as JSON
    Infer {
        /// Image to classify
        image: PathBuf,

        /// Frozen artifact stem or .mpk file
        #[arg(short, long, default_value = FROZEN_ARTIFACT)]
        model: PathBuf,

        #[arg(long, value_enum, default_value_t = ComputeBackend::Auto)]
        backend: ComputeBackend,
    },

    /// Show per-split class counts of a prepared dataset
    Stats {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Prepare {
            metadata,
            image_dirs,
            output_dir,
            seed,
            no_report,
        } => {
            print_banner();
            let mut config = PrepareConfig::new(metadata, image_dirs, output_dir);
            config.split = SplitConfig::new(VALIDATION_FRACTION, seed)?;
            config.write_report = !no_report;
            cmd_prepare(&config)?;
        }

        Commands::Train {
            config,
            data_dir,
            artifact_dir,
            epochs,
            batch_size,
            learning_rate,
            pretrained,
            from_scratch: _,
            freeze_backbone,
            no_augmentation,
            seed,
            image_size,
            backend,
        } => {
            print_banner();
            let config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .map_err(|e| anyhow::anyhow!("{}", e))
                    .with_context(|| format!("Failed to load training config {:?}", path))?,
                None => {
                    let model = ClassifierConfig::new()
                        .with_freeze_backbone(freeze_backbone)
                        .with_pretrained_weights(pretrained);
                    let mut config = TrainingConfig::new(model, AdamConfig::new(), data_dir, artifact_dir)
                        .with_num_epochs(epochs)
                        .with_batch_size(batch_size)
                        .with_learning_rate(learning_rate)
                        .with_seed(seed)
                        .with_image_size(image_size);
                    if no_augmentation {
                        config.augmentation = dermai::dataset::AugmentationConfig::none();
                    }
                    config
                }
            };

            match resolve(backend) {
                ResolvedBackend::Cpu => cmd_train::<TrainingBackend>(&config)?,
                #[cfg(feature = "cuda")]
                ResolvedBackend::Gpu => cmd_train::<dermai::backend::GpuTrainingBackend>(&config)?,
            }
        }

        Commands::Evaluate {
            checkpoint,
            data_dir,
            batch_size,
            output,
            backend,
        } => {
            print_banner();
            match resolve(backend) {
                ResolvedBackend::Cpu => {
                    cmd_evaluate::<CpuBackend>(&checkpoint, &data_dir, batch_size, output.as_deref())?
                }
                #[cfg(feature = "cuda")]
                ResolvedBackend::Gpu => cmd_evaluate::<dermai::backend::GpuBackend>(
                    &checkpoint,
                    &data_dir,
                    batch_size,
                    output.as_deref(),
                )?,
            }
        }

        Commands::Finalize { best, output } => {
            print_banner();
            let written = finalize::<CpuBackend>(&best, &output, &Default::default())
                .with_context(|| format!("Failed to finalize {:?}", best))?;
            println!("{} {}", "Frozen artifact written to".green(), written.display());
        }

        Commands::Infer { image, model, backend } => {
            let json = dermai::inference::predict_json(&model, &image, backend)?;
            println!("{}", json);
        }

        Commands::Stats { data_dir } => {
            print_banner();
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        format!("dermai {} | skin-lesion classification with Burn", dermai::VERSION).green().bold()
    );
    println!();
}

fn cmd_prepare(config: &PrepareConfig) -> Result<()> {
    info!("Preparing dataset from {:?}", config.metadata);

    let report = prepare_dataset(config)?;
    print!("{}", report);

    if !report.missing.is_empty() {
        println!(
            "{} {} images could not be found in any image directory",
            "Warning:".yellow(),
            report.missing.len()
        );
    }
    println!("{} {}", "Output:".cyan(), config.output_dir.display());
    Ok(())
}

fn cmd_train<B: AutodiffBackend>(config: &TrainingConfig) -> Result<()> {
    let started = std::time::Instant::now();
    let outcome = train::<B>(config, &Default::default())?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Duration:      {}", format_duration(started.elapsed().as_secs_f64()));
    match outcome.history.best_epoch {
        Some(epoch) => println!(
            "  Best Val Acc:  {:.4} (epoch {})",
            outcome.history.best_accuracy, epoch
        ),
        None => println!("  Best Val Acc:  no epoch improved on 0.0"),
    }
    if let Some(best) = &outcome.best_checkpoint {
        println!("  Best model:    {}", best.display());
    }
    println!("  Final model:   {}", outcome.final_checkpoint.display());
    println!("  Classes:       {}", outcome.classes.join(", "));
    Ok(())
}

fn cmd_evaluate<B: Backend>(
    checkpoint: &Path,
    data_dir: &Path,
    batch_size: usize,
    output: Option<&Path>,
) -> Result<()> {
    let device = B::Device::default();
    let model = load_checkpoint::<B>(checkpoint, &device)?;
    let image_size = read_metadata(checkpoint)?
        .map(|m| m.image_size)
        .unwrap_or(dermai::IMAGE_SIZE);
    let source = LesionImageSource::from_class_dirs(data_dir)?.with_image_size(image_size);

    let report = evaluate(&model, &source, batch_size, &device)?;

    println!("{}", "Evaluation Results:".cyan().bold());
    println!("  Samples:  {}", report.metrics.total_samples);
    println!("  Loss:     {:.4}", report.avg_loss);
    println!("  Accuracy: {:.4}", report.accuracy);
    println!();
    println!("Confusion Matrix:");
    print!("{}", report.confusion_matrix);
    println!("Classification Report:");
    print!("{}", report.report);

    if let Some(path) = output {
        report.save(path)?;
        println!("{} {}", "Report written to".green(), path.display());
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    println!("{}", "Dataset Statistics:".cyan().bold());
    println!("  {:<8} {:>8} {:>8}", "class", TRAIN_DIR, VAL_DIR);

    let train = LesionImageSource::from_class_dirs(&data_dir.join(TRAIN_DIR))
        .with_context(|| format!("Failed to read {:?}", data_dir.join(TRAIN_DIR)))?
        .class_distribution();
    let val = LesionImageSource::from_class_dirs(&data_dir.join(VAL_DIR))
        .with_context(|| format!("Failed to read {:?}", data_dir.join(VAL_DIR)))?
        .class_distribution();

    for class in LesionClass::ALL {
        println!(
            "  {:<8} {:>8} {:>8}",
            class.code(),
            train[class.index()],
            val[class.index()]
        );
    }
    println!(
        "  {:<8} {:>8} {:>8}",
        "total",
        train.iter().sum::<usize>(),
        val.iter().sum::<usize>()
    );
    Ok(())
}
