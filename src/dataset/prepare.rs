//! Dataset preparation.
//!
//! Turns a HAM10000-style metadata table plus one or more source image folders
//! into `train/<code>/` and `val/<code>/` trees of copied images. Originals are
//! never moved. Re-running with the same seed reproduces the same split and
//! overwrites identical copies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::metadata::{MetadataRecord, MetadataTable};
use crate::dataset::resolver::{ImageResolver, PathProbe, IMAGE_EXTENSION};
use crate::dataset::split::{stratified_split, SplitConfig};
use crate::utils::error::{DermError, Result, ResultExt};

/// Name of the training split directory
pub const TRAIN_DIR: &str = "train";

/// Name of the validation split directory
pub const VAL_DIR: &str = "val";

/// File written next to the split directories
pub const REPORT_FILE: &str = "prepare_report.json";

/// Configuration for dataset preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    /// Metadata CSV with `image_id` and `dx` columns
    pub metadata: PathBuf,
    /// Source directories, searched in order
    pub image_dirs: Vec<PathBuf>,
    /// Root receiving `train/` and `val/`
    pub output_dir: PathBuf,
    pub split: SplitConfig,
    /// Write `prepare_report.json` into the output root
    pub write_report: bool,
}

impl PrepareConfig {
    pub fn new(metadata: PathBuf, image_dirs: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            metadata,
            image_dirs,
            output_dir,
            split: SplitConfig::default(),
            write_report: true,
        }
    }
}

/// Outcome of a preparation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepareReport {
    /// Metadata rows read
    pub total_rows: usize,
    /// Copied images per class code in the training split
    pub train: BTreeMap<String, usize>,
    /// Copied images per class code in the validation split
    pub validation: BTreeMap<String, usize>,
    /// Identifiers not found in any source directory
    pub missing: Vec<String>,
}

impl PrepareReport {
    pub fn copied(&self) -> usize {
        self.train.values().sum::<usize>() + self.validation.values().sum::<usize>()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl std::fmt::Display for PrepareReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset Preparation Summary:")?;
        writeln!(f, "  Metadata rows: {}", self.total_rows)?;
        writeln!(f, "  Copied images: {}", self.copied())?;
        writeln!(f, "  {:<8} {:>8} {:>8}", "class", TRAIN_DIR, VAL_DIR)?;
        let codes: std::collections::BTreeSet<&String> =
            self.train.keys().chain(self.validation.keys()).collect();
        for code in codes {
            writeln!(
                f,
                "  {:<8} {:>8} {:>8}",
                code,
                self.train.get(code).copied().unwrap_or(0),
                self.validation.get(code).copied().unwrap_or(0)
            )?;
        }
        if !self.missing.is_empty() {
            writeln!(f, "  Missing images: {}", self.missing.len())?;
        }
        Ok(())
    }
}

/// Read the metadata table, split it and copy the images.
pub fn prepare_dataset(config: &PrepareConfig) -> Result<PrepareReport> {
    if config.image_dirs.is_empty() {
        return Err(DermError::Config("at least one image directory is required".to_string()));
    }

    let table = MetadataTable::from_path(&config.metadata)?;
    let resolver = ImageResolver::new(config.image_dirs.clone());
    let report = prepare_with_resolver(&table, &resolver, &config.output_dir, &config.split)?;

    if config.write_report {
        report.save(&config.output_dir.join(REPORT_FILE))?;
    }

    Ok(report)
}

/// Split `table` and copy each resolvable image under `output_dir`.
///
/// Missing images are logged and listed in the report; copy failures abort.
pub fn prepare_with_resolver<P: PathProbe>(
    table: &MetadataTable,
    resolver: &ImageResolver<P>,
    output_dir: &Path,
    split: &SplitConfig,
) -> Result<PrepareReport> {
    let records = table.records().to_vec();
    let total_rows = records.len();
    let split = stratified_split(records, |r| r.label, split);

    info!(
        "Split {} rows into {} train / {} val",
        total_rows,
        split.train.len(),
        split.validation.len()
    );

    let mut report = PrepareReport {
        total_rows,
        ..Default::default()
    };

    let train_dir = output_dir.join(TRAIN_DIR);
    let val_dir = output_dir.join(VAL_DIR);
    std::fs::create_dir_all(&train_dir)?;
    std::fs::create_dir_all(&val_dir)?;

    report.train = copy_records(&split.train, resolver, &train_dir, &mut report.missing)?;
    report.validation = copy_records(&split.validation, resolver, &val_dir, &mut report.missing)?;

    Ok(report)
}

fn copy_records<P: PathProbe>(
    records: &[MetadataRecord],
    resolver: &ImageResolver<P>,
    target_dir: &Path,
    missing: &mut Vec<String>,
) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();

    for record in records {
        let class_dir = target_dir.join(record.label.code());
        std::fs::create_dir_all(&class_dir)?;

        let Some(src_path) = resolver.resolve(&record.image_id) else {
            warn!("Image not found: {}.{}", record.image_id, IMAGE_EXTENSION);
            missing.push(record.image_id.clone());
            continue;
        };

        let dst_path = class_dir.join(format!("{}.{}", record.image_id, IMAGE_EXTENSION));
        std::fs::copy(&src_path, &dst_path).with_context(|| {
            format!("copying {} to {}", src_path.display(), dst_path.display())
        })?;

        *counts.entry(record.label.code().to_string()).or_insert(0) += 1;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &Path) -> PrepareConfig {
        let part_1 = dir.join("part_1");
        let part_2 = dir.join("part_2");
        std::fs::create_dir_all(&part_1).unwrap();
        std::fs::create_dir_all(&part_2).unwrap();

        let mut csv = String::from("lesion_id,image_id,dx\n");
        for i in 0..10 {
            let (code, root) = if i < 5 { ("nv", &part_1) } else { ("mel", &part_2) };
            csv.push_str(&format!("HAM_{i},ISIC_{i},{code}\n"));
            if i != 9 {
                std::fs::write(root.join(format!("ISIC_{i}.jpg")), format!("img{i}")).unwrap();
            }
        }
        let metadata = dir.join("metadata.csv");
        std::fs::write(&metadata, csv).unwrap();

        PrepareConfig::new(metadata, vec![part_1, part_2], dir.join("out"))
    }

    #[test]
    fn test_prepare_copies_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());

        let report = prepare_dataset(&config).unwrap();

        assert_eq!(report.total_rows, 10);
        assert_eq!(report.missing, vec!["ISIC_9".to_string()]);
        assert_eq!(report.copied(), 9);
        assert_eq!(report.validation.get("nv"), Some(&1));
        assert_eq!(report.validation.values().sum::<usize>() + report.train.values().sum::<usize>(), 9);

        assert!(config.output_dir.join(REPORT_FILE).exists());
        assert!(dir.path().join("part_1/ISIC_0.jpg").exists());
        assert_eq!(std::fs::read_dir(config.output_dir.join("train/nv")).unwrap().count(), 4);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());

        let first = prepare_dataset(&config).unwrap();
        let second = prepare_dataset(&config).unwrap();

        assert_eq!(first.train, second.train);
        assert_eq!(first.validation, second.validation);
        let val_mel = std::fs::read_dir(config.output_dir.join("val/mel")).unwrap().count();
        assert_eq!(Some(&val_mel), second.validation.get("mel").or(Some(&0)));
    }

    #[test]
    fn test_malformed_metadata_aborts_before_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        let bad = dir.path().join("bad.csv");
        std::fs::write(&bad, "image_id,dx\nISIC_0,nv\nISIC_1,xyz\n").unwrap();
        config.metadata = bad;

        let err = prepare_dataset(&config).unwrap_err();
        assert!(matches!(err, DermError::UnknownLabel { .. }));
        assert!(!config.output_dir.exists());
    }
}
