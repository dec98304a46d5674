//! sightline-core: image classification and face analysis pipeline.
//!
//! Uses a torchvision ResNet-50 (via candle) for classification and SCRFD
//! (via ONNX Runtime) for face detection, merged into one prediction.

pub mod annotate;
pub mod assets;
pub mod classifier;
pub mod detector;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use annotate::AnnotationSink;
pub use classifier::{Classifier, ResNet50};
pub use detector::{FaceAnalyzer, FaceDetector};
pub use error::{ImageDecodeError, InferenceError, ModelLoadError, PipelineError};
pub use labels::LabelTable;
pub use pipeline::{FaceImageRef, FaceSource, Pipeline};
pub use types::{BoundingBox, Classification, FaceDetail, FaceSummary, ImageTensor, PredictionResult};

use std::path::Path;

/// Load the classifier and its label table, checking they agree.
pub fn load_classifier(weights_path: &Path, labels_path: &Path) -> Result<(ResNet50, LabelTable), ModelLoadError> {
    let labels = LabelTable::load(labels_path)?;
    let model = ResNet50::load(weights_path, labels.len())?;
    Ok((model, labels))
}
