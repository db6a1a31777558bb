//! Labeled image source.
//!
//! A finite, re-iterable sequence of (image, label) samples backed either by a
//! directory-per-class layout (`<root>/<code>/<image>.jpg`) or by a metadata
//! table plus an [`ImageResolver`]. Images are decoded on access; a sample that
//! cannot be resolved or decoded is an error for that index, never skipped.

use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::labels::{LesionClass, NUM_CLASSES};
use crate::dataset::metadata::MetadataTable;
use crate::dataset::preprocess::{load_image, normalize, resize_to};
use crate::dataset::resolver::{ImageResolver, LocalFs, PathProbe};
use crate::utils::error::{DermError, Result};
use crate::IMAGE_SIZE;

/// Extensions accepted when scanning class directories
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A single preprocessed sample ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LesionItem {
    /// Image data as flattened, normalized CHW array [3 * size * size]
    pub image: Vec<f32>,
    /// Class index from the label encoding
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Id(String),
}

#[derive(Debug, Clone)]
struct Sample {
    location: Location,
    label: LesionClass,
}

/// Labeled images with lazy decoding
#[derive(Debug, Clone)]
pub struct LesionImageSource<P: PathProbe = LocalFs> {
    samples: Vec<Sample>,
    resolver: Option<ImageResolver<P>>,
    augmenter: Option<Augmenter>,
    image_size: usize,
}

impl LesionImageSource<LocalFs> {
    /// Scan `root/<code>/*` with classes and files in sorted order.
    ///
    /// Every subdirectory must be named after a code in the label encoding.
    pub fn from_class_dirs(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(DermError::Dataset(format!(
                "dataset directory not found: {}",
                root.display()
            )));
        }

        let mut class_dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        class_dirs.sort();

        let mut samples = Vec::new();
        for dir in class_dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let label = LesionClass::from_code(&name, &format!("directory {}", dir.display()))?;

            let before = samples.len();
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_file() && has_image_extension(path) {
                    samples.push(Sample {
                        location: Location::File(path.to_path_buf()),
                        label,
                    });
                }
            }
            debug!("Class {}: {} images", label, samples.len() - before);
        }

        Ok(Self {
            samples,
            resolver: None,
            augmenter: None,
            image_size: IMAGE_SIZE,
        })
    }
}

impl<P: PathProbe> LesionImageSource<P> {
    /// One sample per metadata row, resolved through `resolver` on access
    pub fn from_metadata(table: &MetadataTable, resolver: ImageResolver<P>) -> Self {
        let samples = table
            .records()
            .iter()
            .map(|record| Sample {
                location: Location::Id(record.image_id.clone()),
                label: record.label,
            })
            .collect();

        Self {
            samples,
            resolver: Some(resolver),
            augmenter: None,
            image_size: IMAGE_SIZE,
        }
    }

    /// Enable training-time augmentation for [`augmented_item_at`](Self::augmented_item_at)
    pub fn with_augmentation(mut self, config: AugmentationConfig) -> Self {
        self.augmenter = config.is_enabled().then(|| Augmenter::new(config));
        self
    }

    /// Side of the square input samples are resized to (224 unless overridden)
    pub fn with_image_size(mut self, size: usize) -> Self {
        self.image_size = size;
        self
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn label_at(&self, index: usize) -> Option<LesionClass> {
        self.samples.get(index).map(|s| s.label)
    }

    /// Labels in sample order
    pub fn labels(&self) -> Vec<LesionClass> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Sample count per class index
    pub fn class_distribution(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }

    /// Path of the image behind `index`
    pub fn image_path(&self, index: usize) -> Result<PathBuf> {
        let sample = self.sample(index)?;
        match (&sample.location, &self.resolver) {
            (Location::File(path), _) => Ok(path.clone()),
            (Location::Id(id), Some(resolver)) => resolver.require(id),
            (Location::Id(id), None) => Err(DermError::Dataset(format!(
                "no resolver configured for image '{}'",
                id
            ))),
        }
    }

    /// Preprocessed sample without augmentation
    pub fn item_at(&self, index: usize) -> Result<LesionItem> {
        self.load(index, None)
    }

    /// Preprocessed sample with augmentation drawn from `rng`, if enabled
    pub fn augmented_item_at(&self, index: usize, rng: &mut ChaCha8Rng) -> Result<LesionItem> {
        self.load(index, Some(rng))
    }

    /// Load several samples in parallel, preserving the order of `indices`.
    ///
    /// With an RNG, one seed per sample is drawn sequentially up front so the
    /// result does not depend on thread scheduling.
    pub fn items(&self, indices: &[usize], rng: Option<&mut ChaCha8Rng>) -> Result<Vec<LesionItem>> {
        match rng {
            Some(rng) if self.augmenter.is_some() => {
                let seeds: Vec<u64> = indices.iter().map(|_| rng.gen()).collect();
                indices
                    .par_iter()
                    .zip(seeds.par_iter())
                    .map(|(&index, &seed)| {
                        let mut item_rng = ChaCha8Rng::seed_from_u64(seed);
                        self.load(index, Some(&mut item_rng))
                    })
                    .collect()
            }
            _ => indices
                .par_iter()
                .map(|&index| self.load(index, None))
                .collect(),
        }
    }

    fn sample(&self, index: usize) -> Result<&Sample> {
        self.samples.get(index).ok_or_else(|| {
            DermError::Dataset(format!(
                "index {} out of range for source of length {}",
                index,
                self.samples.len()
            ))
        })
    }

    fn load(&self, index: usize, rng: Option<&mut ChaCha8Rng>) -> Result<LesionItem> {
        let label = self.sample(index)?.label;
        let path = self.image_path(index)?;

        let mut resized = resize_to(&load_image(&path)?, self.image_size);
        if let (Some(augmenter), Some(rng)) = (&self.augmenter, rng) {
            resized = augmenter.augment(resized, rng);
        }

        Ok(LesionItem {
            image: normalize(&resized),
            label: label.index(),
            path,
        })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
