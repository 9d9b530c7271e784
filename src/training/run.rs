//! Training Run Orchestration
//!
//! `train()` wires everything together: run directory setup, augmentation
//! from the backbone spec, class-weighted cross-entropy, a manual epoch
//! loop with one-cycle learning rate and early stopping, checkpoint and
//! config persistence, and the validation report.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion},
};
use chrono::Local;
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::backend::backend_name;
use crate::dataset::augmentation::Augmentation;
use crate::dataset::batch::{TileBatch, TileBatcher, TileDataset, TileItem};
use crate::dataset::loader::HistoCrcDataset;
use crate::model::cnn::TileClassifier;
use crate::model::config::{BackboneSpec, TileClassifierConfig};
use crate::training::scheduler::LrSchedule;
use crate::training::trainer::{CsvLogger, EarlyStopping, EpochRecord};
use crate::validate::{evaluate, validate, validate_binarized};
use crate::{
    DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE, DEFAULT_WEIGHT_DECAY,
    EARLY_STOP_MIN_DELTA, EARLY_STOP_PATIENCE,
};

/// Options for a training run
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Backbone identifier, possibly namespaced ("microsoft/swinv2-...")
    pub backbone: String,
    /// Training dataset directory (class subdirectories of tiles)
    pub train_dir: PathBuf,
    /// Validation dataset directory
    pub valid_dir: PathBuf,
    /// Parent directory for run directories
    pub save_dir: PathBuf,
    /// Batch size
    pub batch_size: usize,
    /// Collapse labels to tumor-vs-rest
    pub binary: bool,
    /// Number of epochs in the fit cycle
    pub epochs: usize,
    /// Peak learning rate of the one-cycle schedule
    pub learning_rate: f64,
    /// Random seed for shuffling and augmentation
    pub seed: u64,
}

impl TrainOptions {
    /// Options with the standard defaults
    pub fn new(
        backbone: impl Into<String>,
        train_dir: impl Into<PathBuf>,
        valid_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backbone: backbone.into(),
            train_dir: train_dir.into(),
            valid_dir: valid_dir.into(),
            save_dir: PathBuf::from("models/"),
            batch_size: DEFAULT_BATCH_SIZE,
            binary: false,
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
        }
    }

    /// Set the save directory
    pub fn with_save_dir(mut self, save_dir: impl Into<PathBuf>) -> Self {
        self.save_dir = save_dir.into();
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable tumor-vs-rest label collapse
    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Build the unique run name for a backbone and binary flag.
///
/// The backbone contributes only its trailing path segment; the timestamp
/// is local time at millisecond precision, so two runs started at least a
/// millisecond apart get distinct names.
pub fn run_name(backbone: &str, binary: bool) -> String {
    let segment = backbone.rsplit('/').next().unwrap_or(backbone);
    let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
    format!("{}_binary={}_{}", segment, binary, timestamp)
}

/// Train a tile classifier, returning the trained model.
///
/// Produces `save_dir/<run_name>/` with config.json, model.mpk,
/// history.csv and report.txt.
pub fn train<B: AutodiffBackend>(opts: &TrainOptions) -> Result<TileClassifier<B>> {
    println!("{}", "Initializing training...".green().bold());

    let device = B::Device::default();
    info!("Backend: {}", backend_name());
    info!("Device: {:?}", device);

    // Run directory
    let name = run_name(&opts.backbone, opts.binary);
    let run_dir = opts.save_dir.join(&name);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory {:?}", run_dir))?;
    info!("Run directory: {:?}", run_dir);

    // Preprocessing from the backbone's declared contract
    let spec = BackboneSpec::resolve(&opts.backbone)?;
    let train_aug = Augmentation::for_training(&spec);
    let valid_aug = Augmentation::for_validation(&spec);

    // Datasets
    println!("{}", "Loading datasets...".cyan());
    let train_ds = HistoCrcDataset::new(&opts.train_dir, opts.binary)?;
    let valid_ds = HistoCrcDataset::new(&opts.valid_dir, opts.binary)?;
    train_ds.describe();

    if train_ds.num_classes() != valid_ds.num_classes() {
        warn!(
            "Class count mismatch: train has {}, valid has {}",
            train_ds.num_classes(),
            valid_ds.num_classes()
        );
    }

    let class_names = train_ds.class_names.clone();
    let class_weights = train_ds.inverse_class_weights();
    info!("Class weights: {:?}", class_weights);

    let mut train_tiles = TileDataset::new(&train_ds, train_aug, opts.seed);
    let valid_tiles = TileDataset::new(&valid_ds, valid_aug, opts.seed);
    let batcher = TileBatcher::new(spec.image_size as usize);

    // Tile decoding runs on one worker per core
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build()
        .context("Failed to build tile loading thread pool")?;

    // Model sized to the dataset's class count
    let config = TileClassifierConfig::new(spec, class_names.clone(), opts.binary);
    config.validate()?;
    let mut model = TileClassifier::<B>::new(&config, &device);
    info!(
        "Model head: {}, parameters: {}",
        model.head_summary(),
        model.num_params()
    );

    let loss_fn = CrossEntropyLossConfig::new()
        .with_weights(Some(class_weights.clone()))
        .init(&device);

    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(DEFAULT_WEIGHT_DECAY)))
        .init();

    let steps_per_epoch = train_tiles.len() / opts.batch_size;
    if steps_per_epoch == 0 {
        anyhow::bail!(
            "Training set ({} tiles) is smaller than one batch ({})",
            train_tiles.len(),
            opts.batch_size
        );
    }

    let schedule = LrSchedule::one_cycle(opts.learning_rate, opts.epochs);
    info!("Schedule: {}", schedule.description());

    let mut early_stopping = EarlyStopping::new(EARLY_STOP_PATIENCE, EARLY_STOP_MIN_DELTA);
    let mut history = CsvLogger::new(run_dir.join("history.csv"));
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(opts.seed);

    println!("{}", "Starting training...".green().bold());
    let mut last_evaluation = None;

    for epoch in 0..opts.epochs {
        let epoch_start = Instant::now();
        println!(
            "{}",
            format!("Epoch {}/{}", epoch + 1, opts.epochs).yellow().bold()
        );

        train_tiles.set_epoch(epoch);
        let mut indices: Vec<usize> = (0..train_tiles.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let mut epoch_loss = 0.0f64;
        let mut batches_done = 0usize;
        let mut last_lr = opts.learning_rate;

        // Trailing partial batch is dropped
        for (step, chunk) in indices.chunks_exact(opts.batch_size).enumerate() {
            let items: Vec<TileItem> = pool.install(|| {
                use rayon::prelude::*;
                chunk.par_iter().filter_map(|&i| train_tiles.get(i)).collect()
            });
            if items.is_empty() {
                continue;
            }

            let batch: TileBatch<B> = batcher.batch(items, &device);
            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output, batch.targets);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss += loss_value;
            batches_done += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);

            last_lr = schedule.lr_at_step(epoch, step, steps_per_epoch);
            model = optimizer.step(last_lr, model, grads);

            if (step + 1) % 50 == 0 || step + 1 == steps_per_epoch {
                println!(
                    "  Batch {:>4}/{}: loss = {:.4}, lr = {:.6}",
                    step + 1,
                    steps_per_epoch,
                    loss_value,
                    last_lr
                );
            }
        }

        let train_loss = epoch_loss / batches_done.max(1) as f64;

        // Evaluate on the inner backend without autodiff overhead
        let inner_device = <B::InnerBackend as Backend>::Device::default();
        let inner_model = model.clone().valid();
        let evaluation = evaluate(
            &inner_model,
            &valid_tiles,
            &batcher,
            opts.batch_size,
            &inner_device,
            &class_weights,
            &class_names,
        )?;

        let seconds = epoch_start.elapsed().as_secs_f64();
        let record = EpochRecord {
            epoch,
            lr: last_lr,
            train_loss,
            valid_loss: evaluation.loss,
            accuracy: evaluation.metrics.accuracy,
            macro_precision: evaluation.metrics.macro_precision,
            macro_recall: evaluation.metrics.macro_recall,
            macro_f1: evaluation.metrics.macro_f1,
            roc_auc: evaluation.metrics.roc_auc.unwrap_or(f64::NAN),
            seconds,
        };
        history.log(&record)?;

        let improved = early_stopping.update(evaluation.loss);
        println!(
            "  {} train_loss: {:.4} | valid_loss: {:.4} | acc: {:.2}%{}",
            "->".cyan(),
            train_loss,
            evaluation.loss,
            evaluation.metrics.accuracy * 100.0,
            if improved {
                " (best)".green().to_string()
            } else {
                String::new()
            }
        );
        info!(
            "Epoch {}/{} done in {:.1}s: train_loss={:.4} valid_loss={:.4}",
            epoch + 1,
            opts.epochs,
            seconds,
            train_loss,
            evaluation.loss
        );

        last_evaluation = Some(evaluation);

        if early_stopping.should_stop() {
            warn!(
                "Early stopping after {} epochs without improvement (best valid_loss {:.4})",
                EARLY_STOP_PATIENCE,
                early_stopping.best_loss()
            );
            break;
        }
    }

    // Persist config and the final weights
    println!("{}", "Saving model...".cyan());
    config.save(&run_dir.join("config.json"))?;
    model
        .clone()
        .save_file(run_dir.join("model"), &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save model weights: {:?}", e))?;
    info!("Saved checkpoint to {:?}", run_dir.join("model.mpk"));

    // Validation report; multi-class runs get a second, binarized section
    if let Some(evaluation) = &last_evaluation {
        let mut report = validate(evaluation);
        if !opts.binary {
            report.push_str("\n\n\n\n\n");
            report.push_str("Binarized:\n");
            report.push_str(&validate_binarized(evaluation, &class_names));
        }
        std::fs::write(run_dir.join("report.txt"), report)?;
    }

    println!("{}", "Training complete!".green().bold());
    println!("  Run directory: {:?}", run_dir);

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_name_uses_trailing_segment() {
        let name = run_name("microsoft/swinv2-tiny-patch4-window8-256", false);
        assert!(name.starts_with("swinv2-tiny-patch4-window8-256_binary=false_"));
        assert!(!name.contains("microsoft"));
    }

    #[test]
    fn test_run_name_without_namespace() {
        let name = run_name("efficientnet-b0", true);
        assert!(name.starts_with("efficientnet-b0_binary=true_"));
    }

    #[test]
    fn test_run_name_timestamp_format() {
        let name = run_name("model", false);
        // model_binary=false_2024-01-01T12:00:00.000
        let timestamp = name.strip_prefix("model_binary=false_").unwrap();
        assert_eq!(timestamp.len(), "2024-01-01T12:00:00.000".len());
        assert_eq!(&timestamp[4..5], "-");
        assert_eq!(&timestamp[10..11], "T");
        assert_eq!(&timestamp[19..20], ".");
    }

    #[test]
    fn test_run_names_differ_across_time() {
        let a = run_name("m", false);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = run_name("m", false);
        assert_ne!(a, b);
    }

    #[test]
    fn test_train_options_defaults() {
        let opts = TrainOptions::new("efficientnet-b0", "train", "valid");
        assert_eq!(opts.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(opts.epochs, DEFAULT_EPOCHS);
        assert_eq!(opts.learning_rate, DEFAULT_LEARNING_RATE);
        assert!(!opts.binary);
        assert_eq!(opts.save_dir, PathBuf::from("models/"));
    }
}
