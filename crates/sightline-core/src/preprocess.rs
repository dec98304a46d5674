//! Upload decoding and classifier input preparation.

use crate::error::ImageDecodeError;
use crate::types::{ImageTensor, CLASSIFIER_INPUT_SIZE};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

// ImageNet statistics the torchvision weights were trained with.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Decode arbitrary image bytes to 8-bit RGB.
///
/// The format is sniffed from the content. Alpha is dropped and grayscale
/// is expanded to three channels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, ImageDecodeError> {
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageDecodeError::Empty);
    }
    Ok(image.to_rgb8())
}

/// Decode bytes and build the classifier tensor in one step.
pub fn preprocess(bytes: &[u8]) -> Result<ImageTensor, ImageDecodeError> {
    let rgb = decode(bytes)?;
    Ok(to_tensor(&rgb))
}

/// Resize to 224×224, scale to [0, 1], normalize per channel, NCHW with batch 1.
pub fn to_tensor(rgb: &RgbImage) -> ImageTensor {
    let size = CLASSIFIER_INPUT_SIZE;
    let resized = imageops::resize(rgb, size as u32, size as u32, RESIZE_FILTER);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let scaled = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (scaled - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    ImageTensor::new(tensor)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn solid_rgb(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
        encode_png(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color))))
    }

    #[test]
    fn test_shape_is_fixed_for_any_resolution() {
        for (w, h) in [(1, 1), (224, 224), (640, 120), (33, 997)] {
            let tensor = preprocess(&solid_rgb(w, h, [10, 20, 30])).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 224, 224], "input {w}x{h}");
        }
    }

    #[test]
    fn test_deterministic() {
        let mut img = RgbImage::new(50, 37);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 5) as u8, (y * 7) as u8, ((x + y) * 3) as u8]);
        }
        let bytes = encode_png(DynamicImage::ImageRgb8(img));
        assert_eq!(preprocess(&bytes).unwrap(), preprocess(&bytes).unwrap());
    }

    #[test]
    fn test_normalization_values() {
        let tensor = preprocess(&solid_rgb(4, 4, [255, 0, 128])).unwrap();
        let arr = tensor.as_array();
        let expected_r = (1.0 - 0.485) / 0.229;
        let expected_g = (0.0 - 0.456) / 0.224;
        let expected_b = (128.0 / 255.0 - 0.406) / 0.225;
        assert!((arr[[0, 0, 100, 100]] - expected_r).abs() < 1e-5);
        assert!((arr[[0, 1, 0, 0]] - expected_g).abs() < 1e-5);
        assert!((arr[[0, 2, 223, 223]] - expected_b).abs() < 1e-5);
    }

    #[test]
    fn test_grayscale_expands_to_equal_channels() {
        let gray = GrayImage::from_pixel(8, 8, Luma([90]));
        let tensor = preprocess(&encode_png(DynamicImage::ImageLuma8(gray))).unwrap();
        let arr = tensor.as_array();
        let raw = |c: usize| arr[[0, c, 5, 5]] * IMAGENET_STD[c] + IMAGENET_MEAN[c];
        assert!((raw(0) - raw(1)).abs() < 1e-5);
        assert!((raw(1) - raw(2)).abs() < 1e-5);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(3, 3, Rgba([200, 100, 50, 0]));
        let decoded = decode(&encode_png(DynamicImage::ImageRgba8(rgba))).unwrap();
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_non_image_bytes_fail() {
        let err = preprocess(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageDecodeError::Decode(_)));
    }
}
