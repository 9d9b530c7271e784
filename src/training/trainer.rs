//! Epoch Bookkeeping
//!
//! Early stopping on validation loss and the per-epoch CSV history log.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Early stopping on a monitored loss.
///
/// An epoch counts as an improvement only when the loss drops below the
/// best seen value by more than `min_delta`. After `patience` epochs
/// without improvement, `should_stop` turns true.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best_loss: f64,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// Create a new early stopping tracker
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best_loss: f64::INFINITY,
            epochs_without_improvement: 0,
        }
    }

    /// Record an epoch's validation loss; returns true on improvement
    pub fn update(&mut self, loss: f64) -> bool {
        if loss < self.best_loss - self.min_delta {
            self.best_loss = loss;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }

    /// Whether training should stop
    pub fn should_stop(&self) -> bool {
        self.epochs_without_improvement >= self.patience
    }

    /// Best loss observed so far
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }
}

/// One row of the training history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Epoch index, starting at 0
    pub epoch: usize,
    /// Learning rate at the last step of the epoch
    pub lr: f64,
    /// Mean training loss over the epoch's batches
    pub train_loss: f64,
    /// Validation loss (class-weighted cross-entropy)
    pub valid_loss: f64,
    /// Validation accuracy
    pub accuracy: f64,
    /// Macro-averaged precision on the validation set
    pub macro_precision: f64,
    /// Macro-averaged recall
    pub macro_recall: f64,
    /// Macro-averaged F1
    pub macro_f1: f64,
    /// Macro one-vs-rest ROC AUC, NaN when undefined
    pub roc_auc: f64,
    /// Wall-clock seconds spent on the epoch
    pub seconds: f64,
}

/// Appends epoch records to history.csv in the run directory
#[derive(Debug)]
pub struct CsvLogger {
    path: PathBuf,
    header_written: bool,
}

impl CsvLogger {
    /// Create a logger writing to the given file; the header goes out with
    /// the first record
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            header_written: false,
        }
    }

    /// Append one epoch record
    pub fn log(&mut self, record: &EpochRecord) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if !self.header_written {
            writeln!(
                file,
                "epoch,lr,train_loss,valid_loss,accuracy,macro_precision,macro_recall,macro_f1,roc_auc,seconds"
            )?;
            self.header_written = true;
        }

        writeln!(
            file,
            "{},{:.8},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.2}",
            record.epoch,
            record.lr,
            record.train_loss,
            record.valid_loss,
            record.accuracy,
            record.macro_precision,
            record.macro_recall,
            record.macro_f1,
            record.roc_auc,
            record.seconds,
        )?;

        Ok(())
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping_improvement_resets_counter() {
        let mut es = EarlyStopping::new(2, 0.01);

        assert!(es.update(1.0));
        assert!(!es.update(0.995)); // Within min_delta, no improvement
        assert!(!es.should_stop());
        assert!(es.update(0.8));
        assert!(!es.should_stop());
    }

    #[test]
    fn test_early_stopping_triggers_after_patience() {
        let mut es = EarlyStopping::new(2, 0.01);

        es.update(1.0);
        es.update(1.1);
        assert!(!es.should_stop());
        es.update(1.2);
        assert!(es.should_stop());
    }

    #[test]
    fn test_early_stopping_min_delta() {
        let mut es = EarlyStopping::new(4, 0.01);

        es.update(1.0);
        // Repeated sub-threshold improvements never reset the counter
        assert!(!es.update(0.999));
        assert!(!es.update(0.998));
        assert!(!es.update(0.997));
        assert!(!es.update(0.996));
        assert!(es.should_stop());
        assert_eq!(es.best_loss(), 1.0);
    }

    #[test]
    fn test_csv_logger_writes_header_once() {
        let path = std::env::temp_dir().join(format!(
            "histocrc_history_test_{}.csv",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut logger = CsvLogger::new(&path);
        let record = EpochRecord {
            epoch: 0,
            lr: 1e-4,
            train_loss: 0.9,
            valid_loss: 0.8,
            accuracy: 0.7,
            macro_precision: 0.6,
            macro_recall: 0.65,
            macro_f1: 0.62,
            roc_auc: 0.9,
            seconds: 12.5,
        };

        logger.log(&record).unwrap();
        let mut second = record.clone();
        second.epoch = 1;
        logger.log(&second).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,lr,train_loss"));
        assert!(lines[1].starts_with("0,"));
        assert!(lines[2].starts_with("1,"));

        std::fs::remove_file(&path).unwrap();
    }
}
