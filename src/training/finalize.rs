//! Freezing the selected checkpoint into the deployable artifact.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::info;

use crate::training::checkpoint::{
    load_checkpoint, read_metadata, save_checkpoint, CheckpointKind, CheckpointMetadata,
};
use crate::utils::error::Result;

/// Load `best` with full validation and persist it unchanged at `output`.
///
/// The sidecar keeps the epoch and accuracy of the source checkpoint.
/// Returns the path of the written record.
pub fn finalize<B: Backend>(best: &Path, output: &Path, device: &B::Device) -> Result<PathBuf> {
    let model = load_checkpoint::<B>(best, device)?;

    let metadata = match read_metadata(best)? {
        Some(source) => source.retag(CheckpointKind::Frozen),
        None => CheckpointMetadata::new(CheckpointKind::Frozen, None, None),
    };

    let written = save_checkpoint(&model, output, &metadata)?;
    load_checkpoint::<B>(output, device)?;

    info!("Frozen {:?} into {:?}", best, written);
    Ok(written)
}
