//! ResNet-18 feature extractor.
//!
//! Field names mirror torchvision's `resnet18` so its state dict can be
//! imported with [`load_pretrained`]. Only the two downsample entries need a
//! key remap; BatchNorm and Linear parameters are adapted by burn-import.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use crate::utils::error::{DermError, Result};

/// Width of the pooled feature vector
pub const FEATURE_DIM: usize = 512;

/// 1x1 projection on the residual path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with an identity or projected shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv3x3(in_channels, out_channels, stride, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.relu.forward(x + identity)
    }
}

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

fn stage<B: Backend>(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Vec<BasicBlock<B>> {
    vec![
        BasicBlock::new(in_channels, out_channels, stride, device),
        BasicBlock::new(out_channels, out_channels, 1, device),
    ]
}

/// ResNet-18 without its classification layer.
///
/// Input: [batch, 3, H, W] → output: [batch, 512]
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet18<B> {
    /// Randomly initialized extractor
    pub fn new(device: &B::Device) -> Self {
        Self {
            conv1: Conv2dConfig::new([3, 64], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: stage(64, 64, 1, device),
            layer2: stage(64, 128, 2, device),
            layer3: stage(128, 256, 2, device),
            layer4: stage(256, FEATURE_DIM, 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        self.avgpool.forward(x).flatten(1, 3)
    }

    /// First convolution of the network
    pub fn stem(&self) -> &Conv2d<B> {
        &self.conv1
    }
}

/// Load torchvision `resnet18` weights (a `.pth` state dict) into `model`.
///
/// The `fc.*` entries of the file are ignored.
pub fn load_pretrained<B: Backend>(model: ResNet18<B>, path: &Path, device: &B::Device) -> Result<ResNet18<B>> {
    if !path.exists() {
        return Err(DermError::CheckpointMissing(path.to_path_buf()));
    }

    let args = LoadArgs::new(path.to_path_buf())
        .with_key_remap(r"downsample\.0\.(.+)", "downsample.conv.$1")
        .with_key_remap(r"downsample\.1\.(.+)", "downsample.bn.$1");

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| DermError::CheckpointLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    info!("Loaded pretrained ResNet-18 weights from {:?}", path);
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_feature_shape() {
        let device = Default::default();
        let model = ResNet18::<TestBackend>::new(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        assert_eq!(model.forward(input).dims(), [2, FEATURE_DIM]);
    }

    #[test]
    fn test_projection_only_on_stage_entry() {
        let device = Default::default();
        let model = ResNet18::<TestBackend>::new(&device);

        assert!(model.layer1[0].downsample.is_none());
        assert!(model.layer2[0].downsample.is_some());
        assert!(model.layer2[1].downsample.is_none());
        assert!(model.layer4[0].downsample.is_some());
    }

    #[test]
    fn test_missing_pretrained_file() {
        let device = Default::default();
        let model = ResNet18::<TestBackend>::new(&device);

        let result = load_pretrained(model, Path::new("/nonexistent/resnet18.pth"), &device);
        assert!(matches!(result, Err(DermError::CheckpointMissing(_))));
    }
}
