//! Dataset loading, augmentation and batching for histopathology tiles

pub mod augmentation;
pub mod batch;
pub mod loader;

pub use augmentation::Augmentation;
pub use batch::{TileBatch, TileBatcher, TileDataset, TileItem};
pub use loader::{DatasetStats, HistoCrcDataset, TileSample};
