//! Model architecture and configuration

pub mod cnn;
pub mod config;

pub use cnn::{ConvBlock, TileClassifier};
pub use config::{BackboneSpec, TileClassifierConfig};
