//! Inference module
//!
//! Loads the frozen artifact, applies the validation preprocessing and runs a
//! single forward pass on a non-autodiff backend.

pub mod predictor;

pub use predictor::{predict, predict_json, prediction_from_probabilities, Prediction, Predictor};
