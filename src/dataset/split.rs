//! Stratified train/validation split.
//!
//! Each class contributes `round(n * validation_fraction)` samples to the
//! validation set, chosen by a seeded ChaCha8 shuffle. Classes are visited in
//! label order so the same seed always yields the same partition.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::labels::LesionClass;
use crate::utils::error::{DermError, Result};
use crate::{DEFAULT_SEED, VALIDATION_FRACTION};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of each class held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: VALIDATION_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(DermError::Config(format!(
                "validation fraction must be in [0, 1), got {}",
                validation_fraction
            )));
        }
        Ok(Self {
            validation_fraction,
            seed,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Disjoint train/validation partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplit<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
}

impl<T> DatasetSplit<T> {
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `items` per class, keeping each class's proportion in both subsets.
pub fn stratified_split<T, F>(items: Vec<T>, label_of: F, config: &SplitConfig) -> DatasetSplit<T>
where
    F: Fn(&T) -> LesionClass,
{
    let mut by_class: BTreeMap<LesionClass, Vec<T>> = BTreeMap::new();
    for item in items {
        by_class.entry(label_of(&item)).or_default().push(item);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for (_, mut class_items) in by_class {
        let n = class_items.len();
        let n_val = ((n as f64 * config.validation_fraction).round() as usize).min(n);

        class_items.shuffle(&mut rng);
        let class_train = class_items.split_off(n_val);

        validation.extend(class_items);
        train.extend(class_train);
    }

    DatasetSplit { train, validation }
}
