//! Training-time augmentation.
//!
//! Only geometric transforms are applied: a random horizontal flip followed by
//! a small random rotation. They run on the resized image, before
//! normalization, and never on validation or inference inputs.

use burn::config::Config;
use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    #[config(default = "0.5")]
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    #[config(default = "10.0")]
    pub rotation_degrees: f32,
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self::new()
            .with_horizontal_flip_prob(0.0)
            .with_rotation_degrees(0.0)
    }

    pub fn is_enabled(&self) -> bool {
        self.horizontal_flip_prob > 0.0 || self.rotation_degrees > 0.0
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Flip then rotate, drawing every decision from `rng`
    pub fn augment(&self, img: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut result = img;

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = image::imageops::flip_horizontal(&result);
        }

        if self.config.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = rotate(&result, angle);
        }

        result
    }
}

/// Rotate around the image center with nearest-neighbour sampling.
/// Pixels that fall outside the source are filled with black.
fn rotate(img: &RgbImage, angle_degrees: f32) -> RgbImage {
    if angle_degrees.abs() < 1e-3 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let angle_rad = angle_degrees.to_radians();
    let (sin_a, cos_a) = angle_rad.sin_cos();

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;

        let src_x = (cx + dx * cos_a + dy * sin_a).round();
        let src_y = (cy - dx * sin_a + dy * cos_a).round();

        if src_x < 0.0 || src_y < 0.0 || src_x >= width as f32 || src_y >= height as f32 {
            Rgb([0, 0, 0])
        } else {
            *img.get_pixel(src_x as u32, src_y as u32)
        }
    })
}
