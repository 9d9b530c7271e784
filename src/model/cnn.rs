//! CNN Model Architecture for Tile Classification
//!
//! Convolutional trunk whose width and depth come from the resolved
//! backbone spec, followed by global average pooling and a linear
//! classification head sized to the dataset's class count.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::config::TileClassifierConfig;

/// Conv2d + BatchNorm + ReLU + MaxPool block
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a block halving the spatial resolution
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Histopathology tile classifier
#[derive(Module, Debug)]
pub struct TileClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> TileClassifier<B> {
    /// Create a classifier from configuration
    pub fn new(config: &TileClassifierConfig, device: &B::Device) -> Self {
        let base = config.backbone.base_filters;

        let mut blocks = Vec::with_capacity(config.backbone.num_blocks);
        let mut in_channels = 3;
        for i in 0..config.backbone.num_blocks {
            let out_channels = base << i;
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = LinearConfig::new(config.backbone.final_filters(), config.hidden_units)
            .init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            blocks,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass, returning logits of shape [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// One-line description of the classification head
    pub fn head_summary(&self) -> String {
        let [in_features, out_features] = self.fc2.weight.val().dims();
        format!("Linear({} -> {})", in_features, out_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::BackboneSpec;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config(num_classes: usize) -> TileClassifierConfig {
        let spec = BackboneSpec {
            id: "test".to_string(),
            image_size: 32,
            mean: [0.5; 3],
            std: [0.25; 3],
            base_filters: 4,
            num_blocks: 2,
        };
        let names = (0..num_classes).map(|i| format!("C{}", i)).collect();
        TileClassifierConfig::new(spec, names, false)
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = small_config(9);
        let model = TileClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 9]);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let device = Default::default();
        let config = small_config(3);
        let model = TileClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let probs = model.forward_softmax(input);

        let sum: f32 = probs.sum().into_scalar();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_head_matches_class_count() {
        let device = Default::default();
        let config = small_config(5);
        let model = TileClassifier::<TestBackend>::new(&config, &device);

        assert_eq!(model.num_classes(), 5);
        assert!(model.head_summary().ends_with("-> 5)"));
    }
}
