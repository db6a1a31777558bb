//! Lesion classifier: ResNet-18 features followed by a fresh linear head.

use std::path::PathBuf;

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use tracing::info;

use crate::dataset::labels::NUM_CLASSES;
use crate::model::resnet::{load_pretrained, ResNet18, FEATURE_DIM};
use crate::utils::error::DermError;

/// Configuration for the lesion classifier
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes (default: 7 for HAM10000)
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,

    /// Exclude the feature extractor from gradient updates
    #[config(default = "false")]
    pub freeze_backbone: bool,

    /// torchvision `resnet18` state dict used to initialize the extractor
    pub pretrained_weights: Option<PathBuf>,
}

impl ClassifierConfig {
    /// A frozen extractor must come with pretrained weights.
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(DermError::Config("num_classes must be at least 1".to_string()));
        }
        if self.freeze_backbone && self.pretrained_weights.is_none() {
            return Err(DermError::Config(
                "freeze_backbone requires pretrained_weights".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the model, importing pretrained weights when configured.
    ///
    /// Freezing is applied here for a fresh model. After loading a record use
    /// [`LesionClassifier::apply_freeze`] again, since loading resets it.
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::utils::error::Result<LesionClassifier<B>> {
        self.validate()?;

        let mut backbone = ResNet18::new(device);
        if let Some(path) = &self.pretrained_weights {
            backbone = load_pretrained(backbone, path, device)?;
        }

        let model = LesionClassifier {
            backbone,
            head: LinearConfig::new(FEATURE_DIM, self.num_classes).init(device),
        };

        Ok(model.apply_freeze(self.freeze_backbone))
    }
}

/// ResNet-18 extractor with a `Linear(512, num_classes)` head
#[derive(Module, Debug)]
pub struct LesionClassifier<B: Backend> {
    pub backbone: ResNet18<B>,
    pub head: Linear<B>,
}

impl<B: Backend> LesionClassifier<B> {
    /// Logits with shape [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Class probabilities with shape [batch, num_classes]
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Output width of the head
    pub fn num_classes(&self) -> usize {
        self.head.weight.dims()[1]
    }

    /// Mark the extractor as not requiring gradients when `freeze` is set
    pub fn apply_freeze(mut self, freeze: bool) -> Self {
        if freeze {
            info!("Freezing feature extractor; only the head is trainable");
            self.backbone = self.backbone.no_grad();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, Int};
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn small_input<B: Backend>(device: &B::Device) -> Tensor<B, 4> {
        Tensor::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_default_config() {
        let config = ClassifierConfig::new();
        assert_eq!(config.num_classes, 7);
        assert!(!config.freeze_backbone);
        assert!(config.pretrained_weights.is_none());
    }

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();

        let logits = model.forward(small_input(&device));
        assert_eq!(logits.dims(), [2, NUM_CLASSES]);
        assert_eq!(model.num_classes(), NUM_CLASSES);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device).unwrap();

        let probs = model.forward_softmax(small_input(&device));
        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_zero_classes_rejected() {
        let device = Default::default();
        let result = ClassifierConfig::new().with_num_classes(0).init::<TestBackend>(&device);
        assert!(matches!(result, Err(DermError::Config(_))));
    }

    #[test]
    fn test_freeze_without_weights_rejected() {
        let device = Default::default();
        let config = ClassifierConfig::new().with_freeze_backbone(true);

        assert!(matches!(config.validate(), Err(DermError::Config(_))));
        let result = config.init::<TestBackend>(&device);
        assert!(matches!(result, Err(DermError::Config(_))));
    }

    #[test]
    fn test_missing_weights_file_is_reported() {
        let device = Default::default();
        let result = ClassifierConfig::new()
            .with_freeze_backbone(true)
            .with_pretrained_weights(Some("/nonexistent/resnet18.pth".into()))
            .init::<TestBackend>(&device);
        assert!(matches!(result, Err(DermError::CheckpointMissing(_))));
    }

    fn backward_grads(freeze: bool) -> (bool, bool) {
        let device = Default::default();
        let model = ClassifierConfig::new()
            .init::<TestAutodiffBackend>(&device)
            .unwrap()
            .apply_freeze(freeze);

        let targets = Tensor::<TestAutodiffBackend, 1, Int>::from_ints([1, 4], &device);
        let logits = model.forward(small_input(&device));
        let loss = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(logits, targets);
        let grads = loss.backward();

        let backbone_grad = model.backbone.stem().weight.grad(&grads).is_some();
        let head_grad = model.head.weight.grad(&grads).is_some();
        (backbone_grad, head_grad)
    }

    #[test]
    fn test_frozen_backbone_gets_no_gradient() {
        let (backbone_grad, head_grad) = backward_grads(true);
        assert!(!backbone_grad);
        assert!(head_grad);
    }

    #[test]
    fn test_unfrozen_backbone_gets_gradient() {
        let (backbone_grad, head_grad) = backward_grads(false);
        assert!(backbone_grad);
        assert!(head_grad);
    }
}
