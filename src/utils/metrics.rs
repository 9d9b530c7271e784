//! Metrics Module for Model Evaluation
//!
//! Metrics for tile classification:
//! - Accuracy
//! - Per-class precision, recall, F1
//! - Confusion matrix
//! - ROC AUC (binary and macro one-vs-rest)
//! - Weighted cross-entropy from probability outputs

use serde::{Deserialize, Serialize};

/// Evaluation metrics derived from predictions and ground truth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Macro-averaged precision (average over classes with support)
    pub macro_precision: f64,

    /// Macro-averaged recall
    pub macro_recall: f64,

    /// Macro-averaged F1-score
    pub macro_f1: f64,

    /// Macro one-vs-rest ROC AUC; None when no probabilities were supplied
    pub roc_auc: Option<f64>,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create metrics from hard predictions and ground truth labels
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let total_samples = predictions.len();
        if total_samples == 0 {
            return Self::default();
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // Macro averages over classes that actually appear in the ground truth
        let valid: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let num_valid = valid.len() as f64;

        let (macro_precision, macro_recall, macro_f1) = if num_valid > 0.0 {
            (
                valid.iter().map(|m| m.precision).sum::<f64>() / num_valid,
                valid.iter().map(|m| m.recall).sum::<f64>() / num_valid,
                valid.iter().map(|m| m.f1).sum::<f64>() / num_valid,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_precision,
            macro_recall,
            macro_f1,
            roc_auc: None,
            per_class,
            confusion_matrix,
        }
    }

    /// Create metrics from predictions plus per-sample class probabilities,
    /// filling in the macro one-vs-rest ROC AUC
    pub fn from_predictions_with_probs(
        predictions: &[usize],
        probabilities: &[Vec<f32>],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut metrics = Self::from_predictions(predictions, ground_truth, num_classes);
        metrics.roc_auc = roc_auc_macro(probabilities, ground_truth, num_classes);
        metrics
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for m in self.per_class.iter_mut() {
            if let Some(name) = names.get(m.class_idx) {
                m.class_name = Some(name.clone());
            }
        }
        self
    }

    /// Render a plain-text metric report
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Samples:          {}\n",
            self.total_samples
        ));
        output.push_str(&format!(
            "Accuracy:         {:.4} ({}/{})\n",
            self.accuracy, self.correct_predictions, self.total_samples
        ));
        output.push_str(&format!("Macro precision:  {:.4}\n", self.macro_precision));
        output.push_str(&format!("Macro recall:     {:.4}\n", self.macro_recall));
        output.push_str(&format!("Macro F1:         {:.4}\n", self.macro_f1));
        if let Some(auc) = self.roc_auc {
            output.push_str(&format!("ROC AUC:          {:.4}\n", auc));
        }

        output.push_str("\nPer-class:\n");
        output.push_str(&format!(
            "{:<12} {:>9} {:>9} {:>9} {:>9}\n",
            "class", "precision", "recall", "f1", "support"
        ));
        for m in &self.per_class {
            let name = m
                .class_name
                .clone()
                .unwrap_or_else(|| m.class_idx.to_string());
            output.push_str(&format!(
                "{:<12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
                name, m.precision, m.recall, m.f1, m.support
            ));
        }

        let names: Option<Vec<&str>> = self
            .per_class
            .iter()
            .map(|m| m.class_name.as_deref())
            .collect();
        output.push_str(&self.confusion_matrix.display(names.as_deref()));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_samples: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            macro_precision: 0.0,
            macro_recall: 0.0,
            macro_f1: 0.0,
            roc_auc: None,
            per_class: Vec::new(),
            confusion_matrix: ConfusionMatrix::default(),
        }
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Class name (if available)
    pub class_name: Option<String>,

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
    /// Calculate metrics for one class from a confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another
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
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), row-major
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

    /// Build a confusion matrix from predictions and ground truth
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

    /// Add a single prediction
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Total sample count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum (correct predictions)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Row sums (actual class counts)
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Pretty print the matrix (abbreviated above 20 classes)
    pub fn display(&self, class_names: Option<&[&str]>) -> String {
        let mut output = String::new();

        output.push_str("\nConfusion matrix (rows=actual, cols=predicted):\n\n");

        let max_display = 20;
        if self.num_classes > max_display {
            output.push_str(&format!(
                "(Matrix too large to display: {}x{})\n",
                self.num_classes, self.num_classes
            ));
            output.push_str(&format!("Total samples: {}\n", self.total()));
            return output;
        }

        output.push_str("          ");
        for col in 0..self.num_classes {
            if let Some(names) = class_names {
                let name = names.get(col).copied().unwrap_or("?");
                output.push_str(&format!("{:>7}", truncate_name(name, 7)));
            } else {
                output.push_str(&format!("{:>7}", col));
            }
        }
        output.push('\n');

        for row in 0..self.num_classes {
            if let Some(names) = class_names {
                let name = names.get(row).copied().unwrap_or("?");
                output.push_str(&format!("{:>9} ", truncate_name(name, 9)));
            } else {
                output.push_str(&format!("{:>9} ", row));
            }

            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("[{:>5}]", count));
                } else if count > 0 {
                    output.push_str(&format!(" {:>5} ", count));
                } else {
                    output.push_str("     . ");
                }
            }
            output.push('\n');
        }

        output
    }
}

/// Truncate a class name on a character boundary for matrix headers
fn truncate_name(name: &str, max_chars: usize) -> String {
    name.chars().take(max_chars).collect()
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

/// Binary ROC AUC by trapezoidal sweep over descending scores.
///
/// Tied scores contribute half credit, so a constant scorer gives 0.5.
/// Returns None when either class is absent.
pub fn roc_auc_binary(scores: &[f64], labels: &[usize]) -> Option<f64> {
    assert_eq!(scores.len(), labels.len());

    let num_pos = labels.iter().filter(|&&l| l == 1).count();
    let num_neg = labels.len() - num_pos;
    if num_pos == 0 || num_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Rank-sum formulation with midranks for ties
    let mut auc_sum = 0.0;
    let mut i = 0;
    let mut rank = 1.0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let tied = (j - i + 1) as f64;
        let midrank = rank + (tied - 1.0) / 2.0;
        for &idx in &order[i..=j] {
            if labels[idx] == 1 {
                auc_sum += midrank;
            }
        }
        rank += tied;
        i = j + 1;
    }

    // Ranks descend by score, so invert to the usual orientation
    let n = order.len() as f64;
    let np = num_pos as f64;
    let nn = num_neg as f64;
    let mean_pos_rank = auc_sum / np;
    Some((n + 1.0 - mean_pos_rank - (np + 1.0) / 2.0) / nn)
}

/// Macro one-vs-rest ROC AUC: average of binary AUCs over every class that
/// has at least one positive and one negative sample
pub fn roc_auc_macro(
    probabilities: &[Vec<f32>],
    ground_truth: &[usize],
    num_classes: usize,
) -> Option<f64> {
    if probabilities.is_empty() {
        return None;
    }

    let mut aucs = Vec::new();
    for class_idx in 0..num_classes {
        let scores: Vec<f64> = probabilities
            .iter()
            .map(|p| p.get(class_idx).copied().unwrap_or(0.0) as f64)
            .collect();
        let labels: Vec<usize> = ground_truth
            .iter()
            .map(|&g| usize::from(g == class_idx))
            .collect();
        if let Some(auc) = roc_auc_binary(&scores, &labels) {
            aucs.push(auc);
        }
    }

    if aucs.is_empty() {
        None
    } else {
        Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
    }
}

/// Class-weighted cross-entropy from probability outputs,
/// sum(w_y * -ln p_y) / sum(w_y)
pub fn weighted_cross_entropy(
    probabilities: &[Vec<f32>],
    ground_truth: &[usize],
    class_weights: &[f32],
) -> f64 {
    assert_eq!(probabilities.len(), ground_truth.len());

    let mut loss_sum = 0.0f64;
    let mut weight_sum = 0.0f64;
    for (probs, &target) in probabilities.iter().zip(ground_truth.iter()) {
        let w = class_weights.get(target).copied().unwrap_or(1.0) as f64;
        let p = (probs.get(target).copied().unwrap_or(0.0) as f64).max(1e-12);
        loss_sum += w * -p.ln();
        weight_sum += w;
    }

    if weight_sum > 0.0 {
        loss_sum / weight_sum
    } else {
        0.0
    }
}
