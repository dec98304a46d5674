//! Render detections onto a copy of the analyzed image and persist it.

use crate::error::InferenceError;
use crate::types::BoundingBox;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LANDMARK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LANDMARK_RADIUS: i32 = 1;

/// Copy `image` and draw each face's box and landmarks on it.
///
/// Shapes that fall partly outside the image are clipped by `imageproc`.
pub fn draw_faces(image: &RgbImage, faces: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.clone();
    for face in faces {
        let [x1, y1, x2, y2] = face.corners().map(|v| v.round() as i32);
        // Thickness grows inward so the outer edge stays on the detected box.
        for t in 0..BOX_THICKNESS {
            let (w, h) = (x2 - x1 + 1 - 2 * t, y2 - y1 + 1 - 2 * t);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
        if let Some(points) = face.landmarks {
            for (x, y) in points {
                let center = (x.round() as i32, y.round() as i32);
                draw_filled_circle_mut(&mut canvas, center, LANDMARK_RADIUS, LANDMARK_COLOR);
            }
        }
    }
    canvas
}

/// Writes annotated copies into one directory, one unique file per request.
#[derive(Debug, Clone)]
pub struct AnnotationSink {
    dir: PathBuf,
}

impl AnnotationSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `image` as JPEG under a fresh `faces_annotated_<uuid>.jpg` name.
    pub fn write(&self, image: &RgbImage) -> Result<PathBuf, InferenceError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| InferenceError::Annotation(format!("{}: {e}", self.dir.display())))?;
        let path = self
            .dir
            .join(format!("faces_annotated_{}.jpg", uuid::Uuid::new_v4()));
        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| InferenceError::Annotation(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "wrote annotated image");
        Ok(path)
    }
}
