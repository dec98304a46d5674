use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Side length of the square classifier input.
pub const CLASSIFIER_INPUT_SIZE: usize = 224;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Corner form `[x1, y1, x2, y2]`.
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// Normalized classifier input, shape (1, 3, 224, 224).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    pub(crate) fn new(data: Array4<f32>) -> Self {
        Self(data)
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }
}

/// One ranked classification entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "class")]
    pub label: String,
    /// Softmax probability as a percentage, rounded to two decimals.
    pub confidence: f32,
}

/// Per-face detail in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetail {
    pub bbox: [f32; 4],
    pub landmark: Option<Vec<[f32; 2]>>,
}

impl From<&BoundingBox> for FaceDetail {
    fn from(face: &BoundingBox) -> Self {
        Self {
            bbox: face.corners(),
            landmark: face
                .landmarks
                .map(|points| points.iter().map(|&(x, y)| [x, y]).collect()),
        }
    }
}

/// Face-analysis half of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSummary {
    pub num_faces: usize,
    pub details: Vec<FaceDetail>,
    /// Where this request's annotated copy was written.
    pub annotated_image: String,
}

/// Response aggregate for one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub classification: Vec<Classification>,
    pub face_analysis: FaceSummary,
}
