//! Metrics Module for Model Evaluation
//!
//! Provides the metrics reported after every validation pass:
//! - Accuracy (overall and per-class)
//! - Precision, Recall, F1-score with macro and weighted averages
//! - Confusion Matrix, always sized to the full label set

use serde::{Deserialize, Serialize};

/// Comprehensive metrics for model evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Macro-averaged precision (over classes with support or predictions)
    pub macro_precision: f64,

    /// Macro-averaged recall
    pub macro_recall: f64,

    /// Macro-averaged F1-score
    pub macro_f1: f64,

    /// Support-weighted precision
    pub weighted_precision: f64,

    /// Support-weighted recall
    pub weighted_recall: f64,

    /// Weighted F1-score (weighted by class frequency)
    pub weighted_f1: f64,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create new metrics from predictions and ground truth labels
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        Self::from_confusion_matrix(confusion_matrix)
    }

    /// Derive every metric from a filled confusion matrix
    pub fn from_confusion_matrix(confusion_matrix: ConfusionMatrix) -> Self {
        let total_samples = confusion_matrix.total();
        let correct_predictions = confusion_matrix.correct();
        let accuracy = confusion_matrix.accuracy();

        let per_class: Vec<ClassMetrics> = (0..confusion_matrix.num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // Classes absent from both labels and predictions are left out of the macro average
        let valid_classes: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || m.predicted() > 0)
            .collect();
        let num_valid = valid_classes.len() as f64;
        let macro_avg = |f: fn(&ClassMetrics) -> f64| {
            if num_valid > 0.0 {
                valid_classes.iter().map(|m| f(m)).sum::<f64>() / num_valid
            } else {
                0.0
            }
        };

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_avg = |f: fn(&ClassMetrics) -> f64| {
            if total_support > 0 {
                per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total_support as f64
            } else {
                0.0
            }
        };

        let macro_precision = macro_avg(|m| m.precision);
        let macro_recall = macro_avg(|m| m.recall);
        let macro_f1 = macro_avg(|m| m.f1);
        let weighted_precision = weighted_avg(|m| m.precision);
        let weighted_recall = weighted_avg(|m| m.recall);
        let weighted_f1 = weighted_avg(|m| m.f1);

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_precision,
            weighted_recall,
            weighted_f1,
            per_class,
            confusion_matrix,
        }
    }

    /// Per-class precision/recall/F1/support table with averages
    pub fn classification_report(&self, class_names: &[String]) -> String {
        let name_width = class_names
            .iter()
            .map(|n| n.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        let mut output = String::new();
        output.push_str(&format!(
            "{:>w$} {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = name_width
        ));

        for m in &self.per_class {
            let name = class_names
                .get(m.class_idx)
                .cloned()
                .unwrap_or_else(|| m.class_idx.to_string());
            output.push_str(&format!(
                "{:>w$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                w = name_width
            ));
        }

        output.push('\n');
        output.push_str(&format!(
            "{:>w$} {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            w = name_width
        ));
        output.push_str(&format!(
            "{:>w$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "macro avg",
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples,
            w = name_width
        ));
        output.push_str(&format!(
            "{:>w$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "weighted avg",
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.total_samples,
            w = name_width
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::from_confusion_matrix(ConfusionMatrix::default())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// True positives
    pub true_positives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually other classes
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as other classes
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }

    /// How often the class was predicted
    pub fn predicted(&self) -> usize {
        self.true_positives + self.false_positives
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Get the row sums (actual class counts)
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Rows as nested vectors
    pub fn rows(&self) -> Vec<Vec<usize>> {
        self.matrix
            .chunks(self.num_classes.max(1))
            .map(|row| row.to_vec())
            .collect()
    }

    /// Pretty print with optional class labels on both axes
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let width = self
            .matrix
            .iter()
            .max()
            .map(|m| m.to_string().len())
            .unwrap_or(1)
            .max(class_names.map(|n| n.iter().map(|s| s.len()).max().unwrap_or(1)).unwrap_or(1));

        let mut output = String::new();
        if let Some(names) = class_names {
            output.push_str(&format!("{:>w$} ", "", w = width));
            for name in names.iter().take(self.num_classes) {
                output.push_str(&format!(" {:>w$}", name, w = width));
            }
            output.push('\n');
        }

        for row in 0..self.num_classes {
            if let Some(names) = class_names {
                let name = names.get(row).map(String::as_str).unwrap_or("?");
                output.push_str(&format!("{:>w$} ", name, w = width));
            }
            output.push('[');
            for col in 0..self.num_classes {
                if col > 0 {
                    output.push(' ');
                }
                output.push_str(&format!("{:>w$}", self.get(row, col), w = width));
            }
            output.push_str("]\n");
        }

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

/// Running average for tracking metrics during training
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    /// Create a new running average
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Get the current average
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    /// Get the count
    pub fn count(&self) -> usize {
        self.count
    }
}
