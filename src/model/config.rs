//! Model Configuration Module
//!
//! The backbone registry maps a backbone identifier to the preprocessing
//! contract it was published with (input size, per-channel normalization)
//! plus the trunk widths used for that capacity class. The classifier
//! config records everything needed to rebuild a trained model, with JSON
//! persistence into the run directory.

use serde::{Deserialize, Serialize};

use crate::utils::error::{HistoCrcError, Result};

/// ImageNet normalization statistics
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing and capacity parameters for a named backbone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneSpec {
    /// Backbone identifier (trailing path segment, e.g. "efficientnet-b0")
    pub id: String,
    /// Square input size in pixels
    pub image_size: u32,
    /// Per-channel normalization mean
    pub mean: [f32; 3],
    /// Per-channel normalization std
    pub std: [f32; 3],
    /// Filter count of the first trunk block; later blocks double it
    pub base_filters: usize,
    /// Number of trunk blocks
    pub num_blocks: usize,
}

impl BackboneSpec {
    /// Resolve a backbone spec from an identifier.
    ///
    /// Identifiers may carry a namespace prefix ("microsoft/swinv2-..."),
    /// only the segment after the last `/` is matched.
    pub fn resolve(backbone: &str) -> Result<Self> {
        let short = backbone.rsplit('/').next().unwrap_or(backbone);

        let (image_size, base_filters, num_blocks) = match short {
            "swinv2-tiny-patch4-window8-256" => (256, 48, 4),
            "efficientnet-b0" => (224, 32, 4),
            "efficientnet-b3" => (300, 40, 4),
            _ => {
                return Err(HistoCrcError::Config(format!(
                    "Unknown backbone '{}' (known: swinv2-tiny-patch4-window8-256, \
                     efficientnet-b0, efficientnet-b3)",
                    backbone
                )))
            }
        };

        Ok(Self {
            id: short.to_string(),
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            base_filters,
            num_blocks,
        })
    }

    /// Trunk output width (filters of the last block)
    pub fn final_filters(&self) -> usize {
        self.base_filters << (self.num_blocks - 1)
    }
}

/// Full classifier configuration, persisted as config.json per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileClassifierConfig {
    /// Backbone the model was derived from
    pub backbone: BackboneSpec,
    /// Number of output classes
    pub num_classes: usize,
    /// Class names indexed by label
    pub class_names: Vec<String>,
    /// Whether labels were collapsed to tumor-vs-rest
    pub binary: bool,
    /// Dropout rate in the classifier head
    pub dropout_rate: f64,
    /// Hidden width of the classifier head
    pub hidden_units: usize,
}

impl TileClassifierConfig {
    /// Build a config from a backbone spec and the dataset's class layout
    pub fn new(backbone: BackboneSpec, class_names: Vec<String>, binary: bool) -> Self {
        Self {
            backbone,
            num_classes: class_names.len(),
            class_names,
            binary,
            dropout_rate: 0.3,
            hidden_units: 256,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(HistoCrcError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.num_classes != self.class_names.len() {
            return Err(HistoCrcError::Config(format!(
                "num_classes ({}) does not match class_names ({})",
                self.num_classes,
                self.class_names.len()
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(HistoCrcError::Config(
                "dropout_rate must be in range [0.0, 1.0)".to_string(),
            ));
        }
        if self.backbone.num_blocks == 0 || self.backbone.base_filters == 0 {
            return Err(HistoCrcError::Config(
                "backbone trunk must have at least one block and one filter".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HistoCrcError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| HistoCrcError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_namespace() {
        let spec = BackboneSpec::resolve("microsoft/swinv2-tiny-patch4-window8-256").unwrap();
        assert_eq!(spec.id, "swinv2-tiny-patch4-window8-256");
        assert_eq!(spec.image_size, 256);
        assert_eq!(spec.base_filters, 48);
    }

    #[test]
    fn test_resolve_bare_id() {
        let spec = BackboneSpec::resolve("efficientnet-b0").unwrap();
        assert_eq!(spec.image_size, 224);
        assert_eq!(spec.mean, IMAGENET_MEAN);
    }

    #[test]
    fn test_resolve_unknown() {
        assert!(BackboneSpec::resolve("google/vit-base-patch16-224").is_err());
    }

    #[test]
    fn test_final_filters() {
        let spec = BackboneSpec::resolve("efficientnet-b0").unwrap();
        // 32 doubled across 4 blocks: 32, 64, 128, 256
        assert_eq!(spec.final_filters(), 256);
    }

    #[test]
    fn test_config_validation() {
        let spec = BackboneSpec::resolve("efficientnet-b0").unwrap();
        let config = TileClassifierConfig::new(
            spec.clone(),
            vec!["OTHER".to_string(), "TUM".to_string()],
            true,
        );
        assert!(config.validate().is_ok());

        let mut broken = config.clone();
        broken.num_classes = 5;
        assert!(broken.validate().is_err());

        let mut broken = config;
        broken.dropout_rate = 1.5;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_config_save_load_roundtrip() {
        let spec = BackboneSpec::resolve("efficientnet-b3").unwrap();
        let names = vec!["ADI".to_string(), "TUM".to_string()];
        let config = TileClassifierConfig::new(spec, names, false);

        let path = std::env::temp_dir().join(format!(
            "histocrc_config_test_{}.json",
            std::process::id()
        ));
        config.save(&path).unwrap();
        let loaded = TileClassifierConfig::load(&path).unwrap();

        assert_eq!(loaded.num_classes, 2);
        assert_eq!(loaded.class_names, config.class_names);
        assert_eq!(loaded.backbone.image_size, 300);

        std::fs::remove_file(&path).unwrap();
    }
}
