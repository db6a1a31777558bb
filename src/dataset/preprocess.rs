//! Image preprocessing shared by training, validation and inference.
//!
//! Every path through the crate goes resize → channel-first floats in [0, 1]
//! → ImageNet normalization. Augmentation, when enabled, runs on the resized
//! image before normalization.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

use crate::utils::error::{DermError, Result};
use crate::IMAGE_SIZE;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of floats in one preprocessed image
pub const INPUT_LEN: usize = 3 * IMAGE_SIZE * IMAGE_SIZE;

/// Smallest input side the five stride-2 stages of ResNet-18 accept
pub const MIN_IMAGE_SIZE: usize = 32;

/// Decode an image from disk
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| DermError::ImageLoadError(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| DermError::ImageLoadError(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| DermError::ImageLoadError(path.to_path_buf(), e.to_string()))
}

/// Number of floats in one preprocessed image of side `size`
pub fn input_len(size: usize) -> usize {
    3 * size * size
}

/// Resize to the square network input, ignoring aspect ratio
pub fn resize(image: &DynamicImage) -> RgbImage {
    resize_to(image, IMAGE_SIZE)
}

/// Resize to a `size` × `size` input, ignoring aspect ratio
pub fn resize_to(image: &DynamicImage, size: usize) -> RgbImage {
    image
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8()
}

/// Convert to CHW floats and apply ImageNet normalization
pub fn normalize(image: &RgbImage) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    data
}

/// Validation/inference preprocessing of a decoded image
pub fn preprocess_image(image: &DynamicImage) -> Vec<f32> {
    preprocess_image_at(image, IMAGE_SIZE)
}

/// [`preprocess_image`] for a model trained at another input side
pub fn preprocess_image_at(image: &DynamicImage, size: usize) -> Vec<f32> {
    normalize(&resize_to(image, size))
}

/// Decode and preprocess an image file
pub fn preprocess_path(path: &Path) -> Result<Vec<f32>> {
    Ok(preprocess_image(&load_image(path)?))
}
