//! Training configuration.

use std::path::PathBuf;

use burn::config::Config;
use burn::optim::AdamConfig;

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::preprocess::MIN_IMAGE_SIZE;
use crate::model::classifier::ClassifierConfig;
use crate::utils::error::DermError;
use crate::IMAGE_SIZE;

/// File name of the resolved configuration in the artifact directory
pub const CONFIG_FILE: &str = "config.json";

/// Everything needed to reproduce a training run
#[derive(Config)]
pub struct TrainingConfig {
    pub model: ClassifierConfig,
    pub optimizer: AdamConfig,
    /// Root containing `train/<code>/` and `val/<code>/`
    pub data_dir: PathBuf,
    /// Receives checkpoints, `config.json` and `history.json`
    pub artifact_dir: PathBuf,
    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,
    #[config(default = "5")]
    pub num_epochs: usize,
    #[config(default = "32")]
    pub batch_size: usize,
    #[config(default = "1.0e-4")]
    pub learning_rate: f64,
    #[config(default = "42")]
    pub seed: u64,
    /// Side length images are resized to before entering the network
    #[config(default = "IMAGE_SIZE")]
    pub image_size: usize,
}

impl TrainingConfig {
    /// Defaults for everything except the two directories
    pub fn with_dirs(data_dir: PathBuf, artifact_dir: PathBuf) -> Self {
        Self::new(ClassifierConfig::new(), AdamConfig::new(), data_dir, artifact_dir)
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        self.model.validate()?;
        if self.num_epochs == 0 {
            return Err(DermError::Config("num_epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(DermError::Config("batch_size must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DermError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(DermError::Config(format!(
                "image_size must be at least {}, got {}",
                MIN_IMAGE_SIZE, self.image_size
            )));
        }
        Ok(())
    }

    pub fn train_dir(&self) -> PathBuf {
        self.data_dir.join(crate::dataset::prepare::TRAIN_DIR)
    }

    pub fn val_dir(&self) -> PathBuf {
        self.data_dir.join(crate::dataset::prepare::VAL_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::with_dirs("data".into(), "artifacts".into());

        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 1.0e-4);
        assert_eq!(config.seed, 42);
        assert_eq!(config.image_size, IMAGE_SIZE);
        assert_eq!(config.augmentation.rotation_degrees, 10.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.train_dir(), PathBuf::from("data/train"));
    }

    #[test]
    fn test_invalid_values() {
        let config = TrainingConfig::with_dirs("d".into(), "a".into());
        assert!(config.clone().with_batch_size(0).validate().is_err());
        assert!(config.clone().with_num_epochs(0).validate().is_err());
        assert!(config.clone().with_image_size(MIN_IMAGE_SIZE - 1).validate().is_err());
        assert!(config.clone().with_image_size(MIN_IMAGE_SIZE).validate().is_ok());
        assert!(config.with_learning_rate(0.0).validate().is_err());
    }

    #[test]
    fn test_frozen_backbone_needs_weights() {
        let mut config = TrainingConfig::with_dirs("d".into(), "a".into());
        config.model = ClassifierConfig::new().with_freeze_backbone(true);
        assert!(matches!(config.validate(), Err(DermError::Config(_))));

        config.model = config.model.with_pretrained_weights(Some("resnet18.pth".into()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = TrainingConfig::with_dirs("d".into(), "a".into())
            .with_num_epochs(3)
            .with_image_size(64);
        config.model = ClassifierConfig::new().with_freeze_backbone(true);

        config.save(&path).unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();

        assert_eq!(loaded.num_epochs, 3);
        assert!(loaded.model.freeze_backbone);
        assert_eq!(loaded.image_size, 64);
    }
}
