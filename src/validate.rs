//! Validation Reports
//!
//! Runs a trained classifier over a validation set and renders the
//! plain-text report stored as report.txt in the run directory. For
//! multi-class runs a second, binarized view collapses predictions and
//! targets to tumor-vs-rest, with the positive score taken as the summed
//! probability of the tumor classes.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use rayon::prelude::*;

use crate::dataset::batch::{TileBatch, TileBatcher, TileDataset, TileItem};
use crate::model::cnn::TileClassifier;
use crate::utils::error::{HistoCrcError, Result};
use crate::utils::metrics::{roc_auc_binary, weighted_cross_entropy, Metrics};

/// Binary class names used by the binarized view
const BINARY_CLASS_NAMES: [&str; 2] = ["OTHER", "TUM"];

/// Everything collected in one evaluation pass
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Class-weighted cross-entropy over the whole set
    pub loss: f64,
    /// Metrics derived from the predictions
    pub metrics: Metrics,
    /// Predicted class per sample
    pub predictions: Vec<usize>,
    /// Softmax probabilities per sample
    pub probabilities: Vec<Vec<f32>>,
    /// Ground-truth labels per sample
    pub targets: Vec<usize>,
}

/// Run the model over a dataset in order, collecting predictions,
/// probabilities and the weighted validation loss
pub fn evaluate<B: Backend>(
    model: &TileClassifier<B>,
    dataset: &TileDataset,
    batcher: &TileBatcher,
    batch_size: usize,
    device: &B::Device,
    class_weights: &[f32],
    class_names: &[String],
) -> Result<Evaluation> {
    let num_classes = model.num_classes();
    let len = dataset.len();

    let mut predictions = Vec::with_capacity(len);
    let mut probabilities = Vec::with_capacity(len);
    let mut targets = Vec::with_capacity(len);

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items: Vec<TileItem> = (start..end)
            .into_par_iter()
            .filter_map(|i| dataset.get(i))
            .collect();
        if items.is_empty() {
            continue;
        }

        targets.extend(items.iter().map(|item| item.label));

        let batch: TileBatch<B> = batcher.batch(items, device);
        let probs = model.forward_softmax(batch.images);

        let probs_data: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| HistoCrcError::Model(format!("Failed to read probabilities: {:?}", e)))?;

        for sample in probs_data.chunks(num_classes) {
            let (best, _) = sample
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |acc, (i, &p)| {
                    if p > acc.1 {
                        (i, p)
                    } else {
                        acc
                    }
                });
            predictions.push(best);
            probabilities.push(sample.to_vec());
        }
    }

    let loss = weighted_cross_entropy(&probabilities, &targets, class_weights);
    let metrics =
        Metrics::from_predictions_with_probs(&predictions, &probabilities, &targets, num_classes)
            .with_class_names(class_names);

    Ok(Evaluation {
        loss,
        metrics,
        predictions,
        probabilities,
        targets,
    })
}

/// Render the standard validation report
pub fn validate(evaluation: &Evaluation) -> String {
    let mut report = String::new();
    report.push_str(&format!("Validation loss: {:.4}\n\n", evaluation.loss));
    report.push_str(&evaluation.metrics.display());
    report
}

/// Collapse an evaluation to tumor-vs-rest and render the report.
///
/// Tumor classes are identified by name (`TUM`, case-insensitive). The
/// positive probability is the sum of tumor-class probabilities, so the
/// binary ROC AUC reflects the model's full probability mass.
pub fn validate_binarized(evaluation: &Evaluation, class_names: &[String]) -> String {
    let tumor: Vec<bool> = class_names
        .iter()
        .map(|name| name.eq_ignore_ascii_case("TUM"))
        .collect();

    let as_binary = |label: usize| usize::from(tumor.get(label).copied().unwrap_or(false));

    let predictions: Vec<usize> = evaluation.predictions.iter().map(|&p| as_binary(p)).collect();
    let targets: Vec<usize> = evaluation.targets.iter().map(|&t| as_binary(t)).collect();

    let positive_scores: Vec<f64> = evaluation
        .probabilities
        .iter()
        .map(|probs| {
            probs
                .iter()
                .enumerate()
                .filter(|(i, _)| tumor.get(*i).copied().unwrap_or(false))
                .map(|(_, &p)| p as f64)
                .sum()
        })
        .collect();

    let names: Vec<String> = BINARY_CLASS_NAMES.iter().map(|s| s.to_string()).collect();
    let mut metrics =
        Metrics::from_predictions(&predictions, &targets, 2).with_class_names(&names);
    metrics.roc_auc = roc_auc_binary(&positive_scores, &targets);

    metrics.display()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fake_evaluation() -> Evaluation {
        // Classes: ADI, STR, TUM. Sample 3 is a missed tumor.
        let predictions = vec![0, 1, 2, 1];
        let targets = vec![0, 1, 2, 2];
        let probabilities = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.1, 0.1, 0.8],
            vec![0.2, 0.5, 0.3],
        ];
        let metrics = Metrics::from_predictions_with_probs(
            &predictions,
            &probabilities,
            &targets,
            3,
        );

        Evaluation {
            loss: 0.42,
            metrics,
            predictions,
            probabilities,
            targets,
        }
    }

    #[test]
    fn test_validate_report_contents() {
        let evaluation = fake_evaluation();
        let report = validate(&evaluation);

        assert!(report.contains("Validation loss: 0.4200"));
        assert!(report.contains("Accuracy:"));
        assert!(report.contains("Confusion matrix"));
    }

    #[test]
    fn test_binarized_mapping() {
        let evaluation = fake_evaluation();
        let report = validate_binarized(&evaluation, &names(&["ADI", "STR", "TUM"]));

        // Binary view: predictions [0,0,1,0], targets [0,0,1,1],
        // 3 of 4 correct
        assert!(report.contains("Accuracy:         0.7500"));
        assert!(report.contains("OTHER"));
        assert!(report.contains("TUM"));
    }

    #[test]
    fn test_binarized_positive_score_is_tumor_mass() {
        // With two tumor-named classes the positive score sums both
        let predictions = vec![0, 1];
        let targets = vec![0, 1];
        let probabilities = vec![vec![0.9, 0.05, 0.05], vec![0.1, 0.5, 0.4]];
        let metrics =
            Metrics::from_predictions_with_probs(&predictions, &probabilities, &targets, 3);
        let evaluation = Evaluation {
            loss: 0.0,
            metrics,
            predictions,
            probabilities,
            targets,
        };

        let report = validate_binarized(&evaluation, &names(&["ADI", "tum", "TUM"]));
        // Sample 1 has tumor mass 0.9, sample 0 has 0.1: perfectly ranked
        assert!(report.contains("ROC AUC:          1.0000"));
    }
}
