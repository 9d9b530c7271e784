//! Histopathology Tile Dataset Loader
//!
//! Loads a directory of class subdirectories of tissue tiles (the
//! NCT-CRC-HE-100K layout) into an indexed sample list. Supports an optional
//! binary collapse where tumor tiles become the positive class and every
//! other tissue type the negative class.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{HistoCrcError, Result};

/// Image extensions recognized as tiles
const TILE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Tumor epithelium class name in the NCT-CRC vocabulary
const TUMOR_CLASS: &str = "TUM";

/// A single tile sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileSample {
    /// Path to the tile file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Original class directory name (e.g. "TUM", "STR")
    pub class_name: String,
}

/// Tile dataset with lazy image loading
#[derive(Debug, Clone)]
pub struct HistoCrcDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples in the dataset
    pub samples: Vec<TileSample>,
    /// Class names indexed by label
    pub class_names: Vec<String>,
    /// Whether labels were collapsed to tumor-vs-rest
    pub binary: bool,
}

impl HistoCrcDataset {
    /// Create a dataset from a directory of class subdirectories.
    ///
    /// With `reduce_to_binary` the tumor class (`TUM`, case-insensitive)
    /// maps to label 1 and everything else to label 0, with class names
    /// `["OTHER", "TUM"]`.
    pub fn new<P: AsRef<Path>>(root_dir: P, reduce_to_binary: bool) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading tile dataset from: {:?}", root_dir);

        if !root_dir.exists() {
            return Err(HistoCrcError::Dataset(format!(
                "Dataset directory does not exist: {:?}",
                root_dir
            )));
        }

        // Discover class directories in sorted order
        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_dirs.push(name.to_string());
                }
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(HistoCrcError::Dataset(format!(
                "No class subdirectories found in {:?}",
                root_dir
            )));
        }

        info!("Found {} classes", class_dirs.len());

        let (class_names, label_of): (Vec<String>, HashMap<String, usize>) = if reduce_to_binary {
            let names = vec!["OTHER".to_string(), TUMOR_CLASS.to_string()];
            let map = class_dirs
                .iter()
                .map(|name| {
                    let label = usize::from(name.eq_ignore_ascii_case(TUMOR_CLASS));
                    (name.clone(), label)
                })
                .collect();
            (names, map)
        } else {
            let map = class_dirs
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.clone(), idx))
                .collect();
            (class_dirs.clone(), map)
        };

        let mut samples = Vec::new();
        for class_name in &class_dirs {
            let class_dir = root_dir.join(class_name);
            let label = label_of[class_name];

            let mut tile_paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .filter(|path| {
                    path.extension()
                        .map(|ext| {
                            let ext = ext.to_string_lossy().to_lowercase();
                            TILE_EXTENSIONS.contains(&ext.as_str())
                        })
                        .unwrap_or(false)
                })
                .collect();
            tile_paths.sort();

            debug!(
                "Class '{}' (label {}): {} tiles",
                class_name,
                label,
                tile_paths.len()
            );

            samples.extend(tile_paths.into_iter().map(|path| TileSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(HistoCrcError::Dataset(format!(
                "No tile images found in {:?}",
                root_dir
            )));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            class_names,
            binary: reduce_to_binary,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Sample count per class label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Mean-normalized inverse-frequency class weights, w_c = N / (K * n_c).
    ///
    /// A perfectly balanced dataset yields 1.0 for every class. Classes with
    /// no samples get weight 0 so they cannot dominate the loss.
    pub fn inverse_class_weights(&self) -> Vec<f32> {
        let counts = self.class_counts();
        let total = self.len() as f32;
        let num_classes = self.num_classes() as f32;

        counts
            .iter()
            .map(|&n| {
                if n > 0 {
                    total / (num_classes * n as f32)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Statistics snapshot for display
    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.len(),
            num_classes: self.num_classes(),
            class_counts: self.class_counts(),
            class_names: self.class_names.clone(),
        }
    }

    /// Print the class histogram
    pub fn describe(&self) {
        self.stats().print();
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\nDataset statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = (count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            let bar: String = "#".repeat(bar_len);
            println!("    {:3}. {:12} {:7} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a tiny class-folder dataset with 1x1 PNG tiles
    fn make_dataset(classes: &[(&str, usize)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "histocrc_loader_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_dir_all(&dir);

        for (name, count) in classes {
            let class_dir = dir.join(name);
            std::fs::create_dir_all(&class_dir).unwrap();
            for i in 0..*count {
                let img = image::RgbImage::from_pixel(1, 1, image::Rgb([128, 64, 32]));
                img.save(class_dir.join(format!("tile_{}.png", i))).unwrap();
            }
        }

        dir
    }

    #[test]
    fn test_class_discovery_sorted() {
        let dir = make_dataset(&[("TUM", 2), ("ADI", 1), ("STR", 3)]);
        let ds = HistoCrcDataset::new(&dir, false).unwrap();

        assert_eq!(ds.class_names, vec!["ADI", "STR", "TUM"]);
        assert_eq!(ds.num_classes(), 3);
        assert_eq!(ds.len(), 6);
        assert_eq!(ds.class_counts(), vec![1, 3, 2]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_binary_collapse() {
        let dir = make_dataset(&[("ADI", 2), ("TUM", 1), ("STR", 1)]);
        let ds = HistoCrcDataset::new(&dir, true).unwrap();

        assert_eq!(ds.class_names, vec!["OTHER", "TUM"]);
        assert_eq!(ds.num_classes(), 2);
        assert_eq!(ds.class_counts(), vec![3, 1]);

        for sample in &ds.samples {
            let expected = usize::from(sample.class_name == "TUM");
            assert_eq!(sample.label, expected);
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_inverse_weights_balanced() {
        let dir = make_dataset(&[("A", 2), ("B", 2)]);
        let ds = HistoCrcDataset::new(&dir, false).unwrap();

        let weights = ds.inverse_class_weights();
        assert_eq!(weights.len(), 2);
        for w in weights {
            assert!((w - 1.0).abs() < 1e-6);
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_inverse_weights_imbalanced() {
        let dir = make_dataset(&[("A", 3), ("B", 1)]);
        let ds = HistoCrcDataset::new(&dir, false).unwrap();

        // N=4, K=2: w_A = 4/(2*3), w_B = 4/(2*1)
        let weights = ds.inverse_class_weights();
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-6);
        assert!((weights[1] - 2.0).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let result = HistoCrcDataset::new("/nonexistent/histocrc/path", false);
        assert!(result.is_err());
    }
}
