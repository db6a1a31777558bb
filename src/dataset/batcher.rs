//! Burn batcher for lesion samples.
//!
//! Items arrive already resized and normalized, so batching is a plain stack
//! into `[batch, 3, size, size]` images and `[batch]` class targets.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::dataset::source::LesionItem;
use crate::IMAGE_SIZE;

/// A batch of lesion images
#[derive(Clone, Debug)]
pub struct LesionBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating lesion batches
#[derive(Clone, Debug)]
pub struct LesionBatcher {
    image_size: usize,
}

impl Default for LesionBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LesionBatcher {
    pub fn new() -> Self {
        Self::with_image_size(IMAGE_SIZE)
    }

    pub fn with_image_size(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Stack raw CHW images without targets
    pub fn images<B: Backend>(&self, images: Vec<Vec<f32>>, device: &B::Device) -> Tensor<B, 4> {
        let batch_size = images.len();
        let data: Vec<f32> = images.into_iter().flatten().collect();

        Tensor::<B, 4>::from_data(
            TensorData::new(data, [batch_size, 3, self.image_size, self.image_size]),
            device,
        )
    }
}

impl<B: Backend> Batcher<B, LesionItem, LesionBatch<B>> for LesionBatcher {
    fn batch(&self, items: Vec<LesionItem>, device: &B::Device) -> LesionBatch<B> {
        let batch_size = items.len();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let images = self.images::<B>(items.into_iter().map(|item| item.image).collect(), device);

        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]).convert::<B::IntElem>(),
            device,
        );

        LesionBatch { images, targets }
    }
}
