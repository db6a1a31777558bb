//! Dataset module
//!
//! - `labels`: the fixed code → class index table
//! - `metadata`, `resolver`: reading HAM10000 metadata and locating images
//! - `split`, `prepare`: stratified split and materialization of `train/`/`val/`
//! - `preprocess`, `augmentation`: the shared image pipeline
//! - `source`, `batcher`: labeled samples and Burn batching

pub mod augmentation;
pub mod batcher;
pub mod labels;
pub mod metadata;
pub mod prepare;
pub mod preprocess;
pub mod resolver;
pub mod source;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{LesionBatch, LesionBatcher};
pub use labels::{class_names, LesionClass, LABEL_ENCODING_VERSION, NUM_CLASSES};
pub use metadata::{MetadataRecord, MetadataTable};
pub use prepare::{prepare_dataset, PrepareConfig, PrepareReport};
pub use resolver::{ImageResolver, LocalFs, PathProbe};
pub use source::{LesionImageSource, LesionItem};
pub use split::{stratified_split, DatasetSplit, SplitConfig};
