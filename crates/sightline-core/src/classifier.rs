//! ResNet-50 image classifier over torchvision weights, via candle.
//!
//! The weights file is a PyTorch `.pth` state dict with torchvision layer
//! names (`conv1`, `bn1`, `layer1.0.conv1`, ..., `fc`). Batch norm runs on
//! its stored running statistics, so every forward pass is pure.

use crate::error::{InferenceError, ModelLoadError};
use crate::types::{ImageTensor, CLASSIFIER_INPUT_SIZE};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use std::path::Path;

/// Number of entries reported per prediction.
pub const TOP_K: usize = 3;

/// Strategy for turning an input tensor into raw per-class scores.
pub trait Classifier {
    /// Output dimensionality; must match the label table.
    fn num_classes(&self) -> usize;

    /// Raw (pre-softmax) scores, one per class.
    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Torchvision ResNet-50 loaded once and shared read-only.
pub struct ResNet50 {
    model: Func<'static>,
    device: Device,
    num_classes: usize,
}

impl ResNet50 {
    /// Load weights for a network with `num_classes` outputs.
    ///
    /// A weights file whose `fc` layer does not have `num_classes` rows is
    /// rejected here rather than at request time.
    pub fn load(weights_path: &Path, num_classes: usize) -> Result<Self, ModelLoadError> {
        if !weights_path.exists() {
            return Err(ModelLoadError::NotFound(weights_path.display().to_string()));
        }

        let device = Device::cuda_if_available(0)?;
        let vb = VarBuilder::from_pth(weights_path, DType::F32, &device)?;
        let classifier = Self::from_var_builder(vb, num_classes)?;

        tracing::info!(
            path = %weights_path.display(),
            classes = num_classes,
            device = ?classifier.device,
            "loaded ResNet-50 classifier"
        );
        Ok(classifier)
    }

    /// Build the network from an already-opened set of tensors.
    pub fn from_var_builder(vb: VarBuilder<'static>, num_classes: usize) -> Result<Self, ModelLoadError> {
        let device = vb.device().clone();
        let model = resnet::resnet50(num_classes, vb)?;
        Ok(Self {
            model,
            device,
            num_classes,
        })
    }
}

impl Classifier for ResNet50 {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let data = input.as_array().as_slice().ok_or_else(|| {
            InferenceError::Classification("input tensor is not contiguous".into())
        })?;
        let size = CLASSIFIER_INPUT_SIZE;
        let xs = Tensor::from_slice(data, (1, 3, size, size), &self.device)?;

        let logits = self.model.forward(&xs)?;
        let scores = logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?;

        if scores.len() != self.num_classes {
            return Err(InferenceError::Classification(format!(
                "expected {} scores, got {}",
                self.num_classes,
                scores.len()
            )));
        }
        Ok(scores)
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}

/// Indices of the `k` largest values, descending. Ties keep the lower index first.
pub fn top_k(probs: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    // Stable sort: equal probabilities stay in index order.
    order.sort_by(|&a, &b| {
        probs[b]
            .partial_cmp(&probs[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(k);
    order
}

/// Probability as a percentage with two decimals.
pub fn to_percent(p: f32) -> f32 {
    (p * 100.0 * 100.0).round() / 100.0
}
