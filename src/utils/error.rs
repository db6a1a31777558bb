//! Error Handling Module
//!
//! Defines the error type shared by every dermai library operation.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dermai operations
#[derive(Error, Debug)]
pub enum DermError {
    /// A metadata row is missing a required field
    #[error("Malformed metadata at data row {row}: {reason}")]
    MalformedMetadata { row: usize, reason: String },

    /// A diagnosis code outside the label encoding
    #[error("Unknown label '{code}' ({context})")]
    UnknownLabel { code: String, context: String },

    /// No candidate directory contains the image
    #[error("Image '{image_id}' not found in any of {searched:?}")]
    ImageNotFound {
        image_id: String,
        searched: Vec<PathBuf>,
    },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoadError(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Checkpoint file does not exist
    #[error("Checkpoint not found: {0}")]
    CheckpointMissing(PathBuf),

    /// Checkpoint exists but could not be read
    #[error("Failed to load checkpoint '{path}': {reason}")]
    CheckpointLoad { path: PathBuf, reason: String },

    /// Stored parameters do not fit the model built for the label encoding
    #[error("Artifact shape mismatch: expected {expected}, found {found}")]
    ArtifactShape { expected: String, found: String },

    /// Checkpoint was written with another label encoding
    #[error("Label encoding mismatch: expected version {expected}, found {found}")]
    LabelEncodingMismatch { expected: u32, found: u32 },

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DermError {
    fn from(err: serde_json::Error) -> Self {
        DermError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for DermError {
    fn from(err: csv::Error) -> Self {
        DermError::Serialization(err.to_string())
    }
}

/// Convenience Result type for dermai operations
pub type Result<T> = std::result::Result<T, DermError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| DermError::Dataset(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DermError::Dataset(format!("{}: {}", f(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DermError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_malformed_metadata_names_row() {
        let err = DermError::MalformedMetadata {
            row: 3,
            reason: "empty dx".to_string(),
        };
        assert!(format!("{}", err).contains("row 3"));
    }

    #[test]
    fn test_image_not_found_lists_roots() {
        let err = DermError::ImageNotFound {
            image_id: "ISIC_0024306".to_string(),
            searched: vec![PathBuf::from("part_1"), PathBuf::from("part_2")],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ISIC_0024306"));
        assert!(msg.contains("part_2"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        assert!(matches!(with_context, Err(DermError::Dataset(msg)) if msg.contains("file not found")));
    }
}
