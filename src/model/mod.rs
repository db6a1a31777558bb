//! Model module
//!
//! - `resnet`: ResNet-18 feature extractor with torchvision parameter names
//! - `classifier`: the extractor plus a fresh linear head and the freeze flag

pub mod classifier;
pub mod resnet;

pub use classifier::{ClassifierConfig, LesionClassifier};
pub use resnet::{load_pretrained, ResNet18, FEATURE_DIM};
