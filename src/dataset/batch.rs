//! Burn Dataset and Batcher for tile classification
//!
//! Tiles are decoded and augmented on demand. Randomness is derived from a
//! per-dataset seed mixed with the sample index and the current epoch, so
//! parallel loading stays deterministic for a fixed seed.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::augmentation::Augmentation;
use crate::dataset::loader::{HistoCrcDataset, TileSample};
use crate::utils::error::{HistoCrcError, Result};

/// A single tile ready for batching
#[derive(Clone, Debug)]
pub struct TileItem {
    /// Normalized CHW float buffer, [3 * size * size]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Source path, kept for error reporting
    pub path: String,
}

impl TileItem {
    /// Decode and augment one sample
    pub fn from_sample(
        sample: &TileSample,
        augmentation: &Augmentation,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self> {
        let img = ImageReader::open(&sample.path)
            .map_err(|e| HistoCrcError::ImageLoad(sample.path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| HistoCrcError::ImageLoad(sample.path.clone(), e.to_string()))?;
        let image = augmentation.apply(img, rng);

        Ok(Self {
            image,
            label: sample.label,
            path: sample.path.to_string_lossy().to_string(),
        })
    }
}

/// Burn Dataset over a loaded tile directory
#[derive(Debug, Clone)]
pub struct TileDataset {
    samples: Vec<TileSample>,
    augmentation: Augmentation,
    seed: u64,
    epoch: u64,
}

impl TileDataset {
    /// Wrap a loaded dataset with a preprocessing pipeline
    pub fn new(dataset: &HistoCrcDataset, augmentation: Augmentation, seed: u64) -> Self {
        Self {
            samples: dataset.samples.clone(),
            augmentation,
            seed,
            epoch: 0,
        }
    }

    /// Advance the augmentation randomness to a new epoch
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch as u64;
    }

    /// Per-item RNG, stable for a given (seed, epoch, index) triple
    fn item_rng(&self, index: usize) -> ChaCha8Rng {
        let mix = self
            .seed
            .wrapping_add(self.epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add((index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
        ChaCha8Rng::seed_from_u64(mix)
    }
}

impl Dataset<TileItem> for TileDataset {
    fn get(&self, index: usize) -> Option<TileItem> {
        let sample = self.samples.get(index)?;
        let mut rng = self.item_rng(index);
        match TileItem::from_sample(sample, &self.augmentation, &mut rng) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping unreadable tile {:?}: {}", sample.path, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of tiles for training or evaluation
#[derive(Clone, Debug)]
pub struct TileBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher assembling pre-normalized tile buffers into tensors
#[derive(Clone, Debug)]
pub struct TileBatcher {
    image_size: usize,
}

impl TileBatcher {
    /// Create a batcher for the given tile edge length
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, TileItem, TileBatch<B>> for TileBatcher {
    fn batch(&self, items: Vec<TileItem>, device: &B::Device) -> TileBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        TileBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batcher_shapes() {
        let size = 4;
        let batcher = TileBatcher::new(size);
        let items = vec![
            TileItem {
                image: vec![0.5; 3 * size * size],
                label: 0,
                path: "a.png".to_string(),
            },
            TileItem {
                image: vec![-0.5; 3 * size * size],
                label: 2,
                path: "b.png".to_string(),
            },
        ];

        let device = Default::default();
        let batch: TileBatch<TestBackend> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, size, size]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 2]);
    }

    #[test]
    fn test_from_sample_missing_file_is_image_load_error() {
        use crate::model::config::BackboneSpec;
        use crate::utils::error::HistoCrcError;
        use std::path::PathBuf;

        let spec = BackboneSpec {
            id: "test".to_string(),
            image_size: 8,
            mean: [0.5; 3],
            std: [0.25; 3],
            base_filters: 4,
            num_blocks: 2,
        };
        let sample = TileSample {
            path: PathBuf::from("/nonexistent/tile.png"),
            label: 0,
            class_name: "TUM".to_string(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let err = TileItem::from_sample(&sample, &Augmentation::for_validation(&spec), &mut rng)
            .unwrap_err();
        assert!(matches!(err, HistoCrcError::ImageLoad(_, _)));
        assert!(format!("{}", err).contains("tile.png"));
    }

    #[test]
    fn test_batcher_preserves_values() {
        let size = 2;
        let batcher = TileBatcher::new(size);
        let buffer: Vec<f32> = (0..3 * size * size).map(|i| i as f32).collect();
        let items = vec![TileItem {
            image: buffer.clone(),
            label: 1,
            path: "t.png".to_string(),
        }];

        let device = Default::default();
        let batch: TileBatch<TestBackend> = batcher.batch(items, &device);

        let values: Vec<f32> = batch.images.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(values, buffer);
    }
}
