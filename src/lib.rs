//! # dermai
//!
//! Dermatoscopic skin-lesion classification with the Burn framework.
//!
//! The crate covers the whole experiment loop for a single operator:
//!
//! - `dataset`: label encoding, metadata parsing, stratified splitting, image
//!   preprocessing and the labeled image source used for training
//! - `model`: ResNet-18 feature extractor with a fresh linear head
//! - `training`: train/validate loop, checkpoint store, evaluator and finalizer
//! - `inference`: single-image prediction against a frozen artifact
//! - `utils`: errors, logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dermai::backend::{ComputeBackend, TrainingBackend};
//! use dermai::training::{train, TrainingConfig};
//!
//! let config = TrainingConfig::new(model_config, AdamConfig::new(), "data".into(), "artifacts".into());
//! let outcome = train::<TrainingBackend>(&config, &Default::default())?;
//! let prediction = dermai::inference::predict(
//!     "final_model/dermai_final.mpk".as_ref(),
//!     "lesion.jpg".as_ref(),
//!     ComputeBackend::Auto,
//! )?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::labels::{LesionClass, LABEL_ENCODING_VERSION, NUM_CLASSES};
pub use inference::{Prediction, Predictor};
pub use model::classifier::{ClassifierConfig, LesionClassifier};
pub use training::{TrainingConfig, TrainingOutcome};
pub use utils::error::{DermError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Side length of the square network input
pub const IMAGE_SIZE: usize = 224;

/// Fraction of each class held out for validation
pub const VALIDATION_FRACTION: f64 = 0.2;

/// Seed used for splitting, shuffling and augmentation unless overridden
pub const DEFAULT_SEED: u64 = 42;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
