//! End-to-end runs on a toy dataset.

use std::path::Path;
use std::process::Command;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use dermai::backend::ComputeBackend;
use dermai::dataset::prepare::{prepare_dataset, PrepareConfig};
use dermai::inference::predict;
use dermai::training::checkpoint::{read_metadata, CheckpointKind};
use dermai::training::config::TrainingConfig;
use dermai::training::finalize::finalize;
use dermai::training::trainer::train;
use dermai::{DermError, NUM_CLASSES};

type TrainBackend = Autodiff<NdArray>;

/// Ten images, five `mel` and five `nv`, plus a metadata table
fn write_raw_dataset(root: &Path) {
    let images = root.join("images");
    std::fs::create_dir_all(&images).unwrap();

    let mut csv = String::from("lesion_id,image_id,dx,dx_type,age,sex,localization\n");
    for i in 0..10u8 {
        let dx = if i % 2 == 0 { "mel" } else { "nv" };
        let id = format!("ISIC_{:07}", i);
        csv.push_str(&format!("HAM_{:07},{},{},histo,50.0,male,back\n", i, id, dx));

        let shade = if dx == "mel" { 40 } else { 200 };
        RgbImage::from_fn(48, 48, |x, y| Rgb([shade, (x * 5) as u8, (y * 5 + i as u32) as u8]))
            .save(images.join(format!("{}.jpg", id)))
            .unwrap();
    }
    std::fs::write(root.join("metadata.csv"), csv).unwrap();
}

#[test]
fn toy_run_prepares_trains_finalizes_and_predicts() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_raw_dataset(root);

    let data_dir = root.join("data");
    let report = prepare_dataset(&PrepareConfig::new(
        root.join("metadata.csv"),
        vec![root.join("images")],
        data_dir.clone(),
    ))
    .unwrap();
    assert_eq!(report.copied(), 10);
    assert_eq!(report.validation.get("mel"), Some(&1));
    assert_eq!(report.validation.get("nv"), Some(&1));
    assert!(report.missing.is_empty());

    let artifact_dir = root.join("artifacts");
    let config = TrainingConfig::with_dirs(data_dir, artifact_dir.clone())
        .with_num_epochs(1)
        .with_batch_size(2)
        .with_image_size(64);
    let outcome = train::<TrainBackend>(&config, &Default::default()).unwrap();

    let matrix = &outcome.last_report.confusion_matrix;
    assert_eq!(matrix.num_classes, NUM_CLASSES);
    assert_eq!(matrix.rows().len(), 7);
    assert!(matrix.rows().iter().all(|row| row.len() == 7));
    assert_eq!(matrix.total(), 2);
    assert_eq!(outcome.classes.len(), 7);
    assert_eq!(outcome.history.epochs.len(), 1);
    assert!(outcome.history.epochs[0].train_loss.is_finite());

    assert!(artifact_dir.join("final_model.mpk").is_file());
    assert!(artifact_dir.join("final_model.json").is_file());
    assert!(artifact_dir.join("config.json").is_file());
    assert!(artifact_dir.join("history.json").is_file());

    let frozen = root.join("final_model").join("dermai_final");
    finalize::<NdArray>(&artifact_dir.join("final_model"), &frozen, &Default::default()).unwrap();
    let metadata = read_metadata(&frozen).unwrap().unwrap();
    assert_eq!(metadata.kind, CheckpointKind::Frozen);
    assert_eq!(metadata.image_size, 64);

    let prediction = predict(
        &frozen,
        &root.join("images").join("ISIC_0000000.jpg"),
        ComputeBackend::Cpu,
    )
    .unwrap();
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(dermai::dataset::class_names().contains(&prediction.predicted_class));
}

#[test]
fn missing_checkpoint_fails_inference() {
    let temp = TempDir::new().unwrap();
    let result = predict(
        &temp.path().join("dermai_final"),
        &temp.path().join("lesion.jpg"),
        ComputeBackend::Cpu,
    );
    assert!(matches!(result, Err(DermError::CheckpointMissing(_))));
}

#[test]
fn infer_binary_prints_nothing_on_failure() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_dermai-infer"))
        .arg(temp.path().join("lesion.jpg"))
        .arg("--model")
        .arg(temp.path().join("missing_model"))
        .arg("--backend")
        .arg("cpu")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Checkpoint not found"));
}
