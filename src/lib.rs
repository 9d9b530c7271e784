//! # histocrc
//!
//! Colorectal cancer histopathology tile classification using the Burn
//! framework. Trains a convolutional classifier over directories of labeled
//! tissue tiles (NCT-CRC-HE-100K style layouts), with class-imbalance
//! weighting, a one-cycle learning-rate schedule, early stopping, and a
//! plain-text validation report per run.
//!
//! ## Modules
//!
//! - `dataset`: tile directory loading, augmentation, batching
//! - `model`: backbone registry and CNN classifier
//! - `training`: run naming, schedulers, early stopping, the `train()` loop
//! - `validate`: validation reports (standard and binarized)
//! - `utils`: errors, logging, metrics
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use histocrc::backend::TrainingBackend;
//! use histocrc::training::{train, TrainOptions};
//!
//! let opts = TrainOptions::new(
//!     "microsoft/swinv2-tiny-patch4-window8-256",
//!     "data/NCT-CRC-HE-100K",
//!     "data/CRC-VAL-HE-7K",
//! );
//! let model = train::<TrainingBackend>(&opts)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;
pub mod validate;

pub use dataset::augmentation::Augmentation;
pub use dataset::batch::{TileBatch, TileBatcher, TileDataset, TileItem};
pub use dataset::loader::{DatasetStats, HistoCrcDataset};
pub use model::cnn::TileClassifier;
pub use model::config::{BackboneSpec, TileClassifierConfig};
pub use training::run::{run_name, train, TrainOptions};
pub use training::scheduler::LrSchedule;
pub use training::trainer::{CsvLogger, EarlyStopping, EpochRecord};
pub use utils::error::{HistoCrcError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};
pub use validate::{validate, validate_binarized, Evaluation};

/// Default number of training epochs (one fit cycle).
pub const DEFAULT_EPOCHS: usize = 4;

/// Default batch size.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default peak learning rate for the one-cycle schedule.
pub const DEFAULT_LEARNING_RATE: f64 = 1e-4;

/// Default weight decay.
pub const DEFAULT_WEIGHT_DECAY: f32 = 1e-6;

/// Early stopping patience (epochs without improvement on validation loss).
pub const EARLY_STOP_PATIENCE: usize = 4;

/// Minimum validation-loss improvement to reset the patience counter.
pub const EARLY_STOP_MIN_DELTA: f64 = 0.01;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
