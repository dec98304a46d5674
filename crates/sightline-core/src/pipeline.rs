//! Dual-model prediction: classification plus face analysis, merged.

use crate::annotate::{self, AnnotationSink};
use crate::classifier::{self, Classifier, TOP_K};
use crate::detector::FaceAnalyzer;
use crate::error::{InferenceError, ModelLoadError, PipelineError};
use crate::labels::LabelTable;
use crate::preprocess;
use crate::types::{Classification, FaceDetail, FaceSummary, ImageTensor, PredictionResult};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Which image the face-analysis phase looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceSource {
    /// The image uploaded with the request.
    Upload,
    /// A fixed reference image on disk, re-read on every request.
    Reference(PathBuf),
}

/// Image handed to the face-analysis phase of one prediction.
#[derive(Debug, Clone, Copy)]
pub enum FaceImageRef<'a> {
    Decoded(&'a RgbImage),
    Path(&'a Path),
}

/// Classifier, labels and face analyzer bound together.
///
/// Constructing one validates that the label table matches the classifier,
/// so label lookups during [`Pipeline::predict`] stay in range.
pub struct Pipeline<C, F> {
    classifier: C,
    labels: LabelTable,
    analyzer: F,
    sink: AnnotationSink,
    face_source: FaceSource,
}

impl<C: Classifier, F: FaceAnalyzer> Pipeline<C, F> {
    pub fn new(
        classifier: C,
        labels: LabelTable,
        analyzer: F,
        sink: AnnotationSink,
        face_source: FaceSource,
    ) -> Result<Self, ModelLoadError> {
        let outputs = classifier.num_classes();
        if labels.len() != outputs {
            return Err(ModelLoadError::LabelMismatch {
                labels: labels.len(),
                outputs,
            });
        }
        if outputs < TOP_K {
            return Err(ModelLoadError::TooFewClasses(outputs, TOP_K));
        }

        Ok(Self {
            classifier,
            labels,
            analyzer,
            sink,
            face_source,
        })
    }

    pub fn face_source(&self) -> &FaceSource {
        &self.face_source
    }

    /// Decode an upload and run the full prediction on it.
    pub fn predict_bytes(&mut self, bytes: &[u8]) -> Result<PredictionResult, PipelineError> {
        let rgb = preprocess::decode(bytes)?;
        let tensor = preprocess::to_tensor(&rgb);

        let result = match self.face_source.clone() {
            FaceSource::Upload => self.predict(&tensor, FaceImageRef::Decoded(&rgb))?,
            FaceSource::Reference(path) => self.predict(&tensor, FaceImageRef::Path(&path))?,
        };
        Ok(result)
    }

    /// Classify `tensor` and analyze faces in `face_image`.
    ///
    /// Either phase failing fails the whole prediction.
    pub fn predict(
        &mut self,
        tensor: &ImageTensor,
        face_image: FaceImageRef<'_>,
    ) -> Result<PredictionResult, InferenceError> {
        let classification = self.classify(tensor)?;
        let face_analysis = match face_image {
            FaceImageRef::Decoded(img) => self.analyze_faces(img)?,
            FaceImageRef::Path(path) => {
                let img = image::open(path).map_err(InferenceError::Reference)?.to_rgb8();
                self.analyze_faces(&img)?
            }
        };

        Ok(PredictionResult {
            classification,
            face_analysis,
        })
    }

    fn classify(&self, tensor: &ImageTensor) -> Result<Vec<Classification>, InferenceError> {
        let scores = self.classifier.scores(tensor)?;
        let probs = classifier::softmax(&scores);

        classifier::top_k(&probs, TOP_K)
            .into_iter()
            .map(|index| {
                let label = self.labels.get(index).ok_or(InferenceError::LabelOutOfRange {
                    index,
                    len: self.labels.len(),
                })?;
                Ok(Classification {
                    label: label.to_string(),
                    confidence: classifier::to_percent(probs[index]),
                })
            })
            .collect()
    }

    fn analyze_faces(&mut self, image: &RgbImage) -> Result<FaceSummary, InferenceError> {
        let faces = self.analyzer.detect(image)?;
        let annotated = annotate::draw_faces(image, &faces);
        let path = self.sink.write(&annotated)?;

        tracing::info!(faces = faces.len(), annotated = %path.display(), "face analysis complete");

        Ok(FaceSummary {
            num_faces: faces.len(),
            details: faces.iter().map(FaceDetail::from).collect(),
            annotated_image: path.display().to_string(),
        })
    }
}
