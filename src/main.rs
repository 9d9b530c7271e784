//! histocrc CLI
//!
//! Train and evaluate colorectal cancer tile classifiers from the command
//! line. Subcommands: `train`, `stats`, `validate`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::module::Module;
use burn::record::CompactRecorder;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use histocrc::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use histocrc::dataset::augmentation::Augmentation;
use histocrc::dataset::batch::{TileBatcher, TileDataset};
use histocrc::dataset::loader::HistoCrcDataset;
use histocrc::model::cnn::TileClassifier;
use histocrc::model::config::TileClassifierConfig;
use histocrc::training::run::{train, TrainOptions};
use histocrc::utils::logging::{init_logging, LogConfig};
use histocrc::validate::{evaluate, validate, validate_binarized};

/// Colorectal cancer histopathology tile classification
#[derive(Parser, Debug)]
#[command(name = "histocrc")]
#[command(version)]
#[command(about = "Histopathology tile classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a tile classifier
    Train {
        /// Backbone identifier
        #[arg(long, default_value = "microsoft/swinv2-tiny-patch4-window8-256")]
        backbone: String,

        /// Training dataset directory (class subdirectories of tiles)
        #[arg(long)]
        train_dir: PathBuf,

        /// Validation dataset directory
        #[arg(long)]
        valid_dir: PathBuf,

        /// Parent directory for run directories
        #[arg(long, default_value = "models/")]
        save_dir: PathBuf,

        /// Batch size
        #[arg(short, long, default_value = "64")]
        batch_size: usize,

        /// Collapse labels to tumor-vs-rest
        #[arg(long, default_value = "false")]
        binary: bool,

        /// Number of epochs
        #[arg(short, long, default_value = "4")]
        epochs: usize,

        /// Peak learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Collapse labels to tumor-vs-rest before counting
        #[arg(long, default_value = "false")]
        binary: bool,
    },

    /// Regenerate a validation report from a saved run
    Validate {
        /// Run directory containing config.json and model.mpk
        #[arg(short, long)]
        run_dir: PathBuf,

        /// Dataset directory to evaluate against
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Batch size
        #[arg(short, long, default_value = "64")]
        batch_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            backbone,
            train_dir,
            valid_dir,
            save_dir,
            batch_size,
            binary,
            epochs,
            learning_rate,
            seed,
        } => {
            let mut opts = TrainOptions::new(backbone, train_dir, valid_dir)
                .with_save_dir(save_dir)
                .with_batch_size(batch_size)
                .with_binary(binary)
                .with_seed(seed);
            opts.epochs = epochs;
            opts.learning_rate = learning_rate;

            train::<TrainingBackend>(&opts)?;
        }

        Commands::Stats { data_dir, binary } => {
            cmd_stats(&data_dir, binary)?;
        }

        Commands::Validate {
            run_dir,
            data_dir,
            batch_size,
        } => {
            cmd_validate(&run_dir, &data_dir, batch_size)?;
        }
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path, binary: bool) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {:?}",
            "Error:".red(),
            data_dir
        );
        return Ok(());
    }

    let dataset = HistoCrcDataset::new(data_dir, binary)?;
    dataset.describe();

    let weights = dataset.inverse_class_weights();
    println!("\n  Inverse class weights:");
    for (name, weight) in dataset.class_names.iter().zip(weights.iter()) {
        println!("    {:12} {:.4}", name, weight);
    }

    Ok(())
}

fn cmd_validate(run_dir: &Path, data_dir: &Path, batch_size: usize) -> Result<()> {
    println!("{}", "Loading run...".cyan());
    println!("  Run directory: {:?}", run_dir);
    println!("  Backend: {}", backend_name());

    let config = TileClassifierConfig::load(&run_dir.join("config.json"))?;
    let device = default_device();

    let model = TileClassifier::<DefaultBackend>::new(&config, &device)
        .load_file(run_dir.join("model"), &CompactRecorder::new(), &device)
        .map_err(|e| anyhow::anyhow!("Failed to load model weights: {:?}", e))?;
    info!("Loaded model head: {}", model.head_summary());

    let dataset = HistoCrcDataset::new(data_dir, config.binary)?;
    if dataset.num_classes() != config.num_classes {
        anyhow::bail!(
            "Dataset has {} classes but the saved model expects {}",
            dataset.num_classes(),
            config.num_classes
        );
    }

    let augmentation = Augmentation::for_validation(&config.backbone);
    let tiles = TileDataset::new(&dataset, augmentation, 0);
    let batcher = TileBatcher::new(config.backbone.image_size as usize);
    let class_weights = dataset.inverse_class_weights();

    println!("{}", "Evaluating...".cyan());
    let evaluation = evaluate(
        &model,
        &tiles,
        &batcher,
        batch_size,
        &device,
        &class_weights,
        &config.class_names,
    )?;

    let mut report = validate(&evaluation);
    if !config.binary {
        report.push_str("\n\n\n\n\n");
        report.push_str("Binarized:\n");
        report.push_str(&validate_binarized(&evaluation, &config.class_names));
    }

    println!("\n{}", report);
    Ok(())
}
