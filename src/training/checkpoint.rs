//! Model checkpointing.
//!
//! A checkpoint is a burn record file `<stem>.mpk` holding parameter values
//! plus a JSON sidecar `<stem>.json` describing it. Extensions are appended,
//! so a dotted stem such as `model.v2` keeps its full name. Both are written to a
//! hidden sibling first and renamed into place, so an interrupted write never
//! replaces a valid checkpoint with a partial one.
//!
//! Loading rebuilds the model for the current label encoding and refuses any
//! artifact whose head does not match it.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::labels::{class_names, LABEL_ENCODING_VERSION, NUM_CLASSES};
use crate::dataset::preprocess::MIN_IMAGE_SIZE;
use crate::model::classifier::{ClassifierConfig, LesionClassifier};
use crate::model::resnet::FEATURE_DIM;
use crate::utils::error::{DermError, Result};
use crate::IMAGE_SIZE;

/// Recorder used for every checkpoint
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Extension of the parameter file
pub const RECORD_EXTENSION: &str = "mpk";

/// Extension of the sidecar
pub const SIDECAR_EXTENSION: &str = "json";

/// Stem of the best-so-far checkpoint in the artifact directory
pub const BEST_CHECKPOINT: &str = "best_model";

/// Stem of the end-of-training checkpoint in the artifact directory
pub const FINAL_CHECKPOINT: &str = "final_model";

/// Default location of the deployable artifact
pub const FROZEN_ARTIFACT: &str = "final_model/dermai_final";

/// Which point of the workflow produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Best,
    Final,
    Frozen,
}

/// Sidecar describing a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub kind: CheckpointKind,
    pub epoch: Option<usize>,
    pub validation_accuracy: Option<f64>,
    pub num_classes: usize,
    pub class_names: Vec<String>,
    pub label_encoding_version: u32,
    /// Side length of the square input the model was trained on
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    pub timestamp: String,
}

fn default_image_size() -> usize {
    IMAGE_SIZE
}

impl CheckpointMetadata {
    pub fn new(kind: CheckpointKind, epoch: Option<usize>, validation_accuracy: Option<f64>) -> Self {
        Self {
            kind,
            epoch,
            validation_accuracy,
            num_classes: NUM_CLASSES,
            class_names: class_names(),
            label_encoding_version: LABEL_ENCODING_VERSION,
            image_size: IMAGE_SIZE,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_image_size(mut self, image_size: usize) -> Self {
        self.image_size = image_size;
        self
    }

    /// Same provenance, re-tagged as another kind
    pub fn retag(&self, kind: CheckpointKind) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..self.clone()
        }
    }

    /// Check that the sidecar matches the current label encoding
    pub fn validate(&self) -> Result<()> {
        if self.label_encoding_version != LABEL_ENCODING_VERSION {
            return Err(DermError::LabelEncodingMismatch {
                expected: LABEL_ENCODING_VERSION,
                found: self.label_encoding_version,
            });
        }
        if self.num_classes != NUM_CLASSES {
            return Err(DermError::ArtifactShape {
                expected: format!("{} classes", NUM_CLASSES),
                found: format!("{} classes", self.num_classes),
            });
        }
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(DermError::ArtifactShape {
                expected: format!("input side of at least {}", MIN_IMAGE_SIZE),
                found: format!("input side {}", self.image_size),
            });
        }
        Ok(())
    }
}

/// `path` without a trailing `.mpk` or `.json`
pub fn checkpoint_stem(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(RECORD_EXTENSION) | Some(SIDECAR_EXTENSION) => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

fn append_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = checkpoint_stem(stem).into_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// `<stem>.mpk`
pub fn record_path(stem: &Path) -> PathBuf {
    append_extension(stem, RECORD_EXTENSION)
}

/// `<stem>.json`
pub fn sidecar_path(stem: &Path) -> PathBuf {
    append_extension(stem, SIDECAR_EXTENSION)
}

/// Hidden sibling used while writing `stem`
fn partial_stem(stem: &Path) -> PathBuf {
    let stem = checkpoint_stem(stem);
    let name = stem
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.with_file_name(format!(".{}.partial", name))
}

/// Persist `model` and its sidecar at `stem`. Returns the record path.
pub fn save_checkpoint<B: Backend>(
    model: &LesionClassifier<B>,
    stem: &Path,
    metadata: &CheckpointMetadata,
) -> Result<PathBuf> {
    if let Some(parent) = stem.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_stem(stem);
    let recorder = CheckpointRecorder::new();
    // burn calls set_extension on the path; hand it one that already ends in .mpk
    model
        .clone()
        .save_file(record_path(&partial), &recorder)
        .map_err(|e| DermError::Model(format!("failed to write {:?}: {}", stem, e)))?;

    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(sidecar_path(&partial), json)?;

    let target = record_path(stem);
    fs::rename(record_path(&partial), &target)?;
    fs::rename(sidecar_path(&partial), sidecar_path(stem))?;

    debug!("Checkpoint written to {:?}", target);
    Ok(target)
}

/// Read the sidecar next to `stem`, `None` if there is none
pub fn read_metadata(stem: &Path) -> Result<Option<CheckpointMetadata>> {
    let path = sidecar_path(stem);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path)?;
    let metadata = serde_json::from_str(&json).map_err(|e| DermError::CheckpointLoad {
        path: path.clone(),
        reason: format!("invalid sidecar: {}", e),
    })?;
    Ok(Some(metadata))
}

/// Load a checkpoint into a model built for the current label encoding.
///
/// Accepts the stem or the `.mpk` path.
pub fn load_checkpoint<B: Backend>(stem: &Path, device: &B::Device) -> Result<LesionClassifier<B>> {
    let record = record_path(stem);
    if !record.is_file() {
        return Err(DermError::CheckpointMissing(record));
    }

    if let Some(metadata) = read_metadata(stem)? {
        metadata.validate()?;
    }

    let model = ClassifierConfig::new()
        .init::<B>(device)?
        .load_file(record.clone(), &CheckpointRecorder::new(), device)
        .map_err(|e| DermError::CheckpointLoad {
            path: record.clone(),
            reason: e.to_string(),
        })?;

    validate_head(&model)?;
    info!("Loaded checkpoint {:?}", record);
    Ok(model)
}

/// The head must map the 512 extractor features to exactly `NUM_CLASSES` logits.
pub fn validate_head<B: Backend>(model: &LesionClassifier<B>) -> Result<()> {
    let weight = model.head.weight.dims();
    let bias = model.head.bias.as_ref().map(|b| b.dims()[0]);

    if weight != [FEATURE_DIM, NUM_CLASSES] || bias != Some(NUM_CLASSES) {
        return Err(DermError::ArtifactShape {
            expected: format!("head weight {:?}, bias [{}]", [FEATURE_DIM, NUM_CLASSES], NUM_CLASSES),
            found: format!("head weight {:?}, bias {:?}", weight, bias),
        });
    }
    Ok(())
}

/// Best and final checkpoints of one training run
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    image_size: usize,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            image_size: IMAGE_SIZE,
        }
    }

    /// Input side recorded in every sidecar this store writes
    pub fn with_image_size(mut self, image_size: usize) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_stem(&self) -> PathBuf {
        self.dir.join(BEST_CHECKPOINT)
    }

    pub fn final_stem(&self) -> PathBuf {
        self.dir.join(FINAL_CHECKPOINT)
    }

    pub fn save_best<B: Backend>(
        &self,
        model: &LesionClassifier<B>,
        epoch: usize,
        accuracy: f64,
    ) -> Result<PathBuf> {
        let metadata = CheckpointMetadata::new(CheckpointKind::Best, Some(epoch), Some(accuracy))
            .with_image_size(self.image_size);
        save_checkpoint(model, &self.best_stem(), &metadata)
    }

    pub fn save_final<B: Backend>(
        &self,
        model: &LesionClassifier<B>,
        epoch: usize,
        accuracy: Option<f64>,
    ) -> Result<PathBuf> {
        let metadata = CheckpointMetadata::new(CheckpointKind::Final, Some(epoch), accuracy)
            .with_image_size(self.image_size);
        save_checkpoint(model, &self.final_stem(), &metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn input(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_round_trip_reproduces_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();
        let x = input(&device);

        let stem = temp_dir.path().join("model");
        let path = save_checkpoint(&model, &stem, &CheckpointMetadata::new(CheckpointKind::Best, Some(1), Some(0.5))).unwrap();
        assert_eq!(path, temp_dir.path().join("model.mpk"));
        assert!(temp_dir.path().join("model.json").exists());

        let loaded = load_checkpoint::<TestBackend>(&path, &device).unwrap();

        let before: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = loaded.forward(x).into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_no_partial_files_left() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();

        let store = CheckpointStore::new(temp_dir.path());
        store.save_best(&model, 1, 0.7).unwrap();
        store.save_best(&model, 3, 0.8).unwrap();

        let mut names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["best_model.json", "best_model.mpk"]);

        let metadata = read_metadata(&store.best_stem()).unwrap().unwrap();
        assert_eq!(metadata.epoch, Some(3));
        assert_eq!(metadata.kind, CheckpointKind::Best);
    }

    #[test]
    fn test_dotted_stem_keeps_its_name() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();
        let x = input(&device);

        let stem = temp_dir.path().join("model.v2");
        assert_eq!(record_path(&stem), temp_dir.path().join("model.v2.mpk"));
        assert_eq!(sidecar_path(&record_path(&stem)), temp_dir.path().join("model.v2.json"));

        let path = save_checkpoint(&model, &stem, &CheckpointMetadata::new(CheckpointKind::Final, Some(2), None)).unwrap();
        assert_eq!(path, temp_dir.path().join("model.v2.mpk"));
        assert!(temp_dir.path().join("model.v2.json").exists());
        assert!(!temp_dir.path().join("model.mpk").exists());

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);

        let loaded = load_checkpoint::<TestBackend>(&stem, &device).unwrap();
        let before: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = loaded.forward(x).into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_sidecar_records_image_size() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();

        let store = CheckpointStore::new(temp_dir.path()).with_image_size(64);
        store.save_final(&model, 1, None).unwrap();
        let metadata = read_metadata(&store.final_stem()).unwrap().unwrap();
        assert_eq!(metadata.image_size, 64);

        // sidecars written before the field existed fall back to the default side
        let legacy = r#"{"kind":"best","epoch":1,"validation_accuracy":0.5,"num_classes":7,
            "class_names":["akiec","bcc","bkl","df","mel","nv","vasc"],
            "label_encoding_version":1,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let parsed: CheckpointMetadata = serde_json::from_str(legacy).unwrap();
        assert_eq!(parsed.image_size, IMAGE_SIZE);

        let tiny = CheckpointMetadata::new(CheckpointKind::Best, None, None).with_image_size(8);
        assert!(matches!(tiny.validate(), Err(DermError::ArtifactShape { .. })));
    }

    #[test]
    fn test_missing_checkpoint() {
        let device = Default::default();
        let result = load_checkpoint::<TestBackend>(Path::new("/nonexistent/dermai_final"), &device);
        assert!(matches!(result, Err(DermError::CheckpointMissing(p)) if p.ends_with("dermai_final.mpk")));
    }

    #[test]
    fn test_wrong_class_count_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_num_classes(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let stem = temp_dir.path().join("three");
        let mut metadata = CheckpointMetadata::new(CheckpointKind::Final, Some(1), None);
        metadata.num_classes = 3;
        save_checkpoint(&model, &stem, &metadata).unwrap();

        let result = load_checkpoint::<TestBackend>(&stem, &device);
        assert!(matches!(result, Err(DermError::ArtifactShape { .. })));
        assert!(validate_head(&model).is_err());
    }

    #[test]
    fn test_label_encoding_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();

        let stem = temp_dir.path().join("old");
        let mut metadata = CheckpointMetadata::new(CheckpointKind::Frozen, None, None);
        metadata.label_encoding_version = LABEL_ENCODING_VERSION + 1;
        save_checkpoint(&model, &stem, &metadata).unwrap();

        let result = load_checkpoint::<TestBackend>(&stem, &device);
        assert!(matches!(result, Err(DermError::LabelEncodingMismatch { .. })));
    }

    #[test]
    fn test_corrupt_record() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let stem = temp_dir.path().join("broken");
        fs::write(record_path(&stem), b"not a record").unwrap();

        let result = load_checkpoint::<TestBackend>(&stem, &device);
        assert!(matches!(result, Err(DermError::CheckpointLoad { .. })));
    }
}
