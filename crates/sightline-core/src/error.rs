//! Error kinds shared across the pipeline.

use crate::detector::DetectorError;
use thiserror::Error;

/// Failure to bring a model or its label table into memory. Fatal at startup.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("weights could not be loaded: {0}")]
    Weights(#[from] candle_core::Error),
    #[error("label file unreadable: {0}")]
    Labels(#[from] std::io::Error),
    #[error("label file is empty")]
    EmptyLabels,
    #[error("label table has {labels} entries but the classifier has {outputs} outputs")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("classifier has {0} outputs, need at least {1} for top-k")]
    TooFewClasses(usize, usize),
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
}

/// Uploaded bytes are not a usable raster image.
#[derive(Error, Debug)]
pub enum ImageDecodeError {
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    Empty,
}

/// Failure while running either model or writing the annotated copy.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("class index {index} outside label table of {len}")]
    LabelOutOfRange { index: usize, len: usize },
    #[error("face analysis failed: {0}")]
    FaceAnalysis(#[from] DetectorError),
    #[error("face reference image: {0}")]
    Reference(image::ImageError),
    #[error("annotated image write failed: {0}")]
    Annotation(String),
}

impl From<candle_core::Error> for InferenceError {
    fn from(e: candle_core::Error) -> Self {
        InferenceError::Classification(e.to_string())
    }
}

/// Request-time failure of the whole prediction.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    ImageDecode(#[from] ImageDecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PipelineError {
    /// Stable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ImageDecode(_) => "image_decode",
            PipelineError::Inference(_) => "inference",
        }
    }
}
