//! Training module
//!
//! - `config`: the reproducible run configuration
//! - `trainer`: the train/validate loop and best-checkpoint policy
//! - `evaluator`: loss, accuracy, confusion matrix and report over a source
//! - `checkpoint`: atomic best/final/frozen artifacts with sidecars
//! - `finalize`: freezing the best checkpoint for deployment

pub mod checkpoint;
pub mod config;
pub mod evaluator;
pub mod finalize;
pub mod trainer;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointKind, CheckpointMetadata, CheckpointStore};
pub use config::TrainingConfig;
pub use evaluator::{evaluate, EvaluationReport};
pub use finalize::finalize;
pub use trainer::{train, BestTracker, TrainingHistory, TrainingOutcome};
