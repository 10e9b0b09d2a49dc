//! Frame type and preprocessing: luma conversion, cropping, histogram
//! equalization, smoothing, dark detection.

use facegate_core::FaceSample;
use image::{DynamicImage, GrayImage};

/// Pixels below this level count as dark.
const DARK_LEVEL: u8 = 32;
/// Default fraction of dark pixels above which a frame is discarded.
pub const DEFAULT_DARK_THRESHOLD: f32 = 0.95;
/// Gaussian sigma for the light denoise applied before extraction.
const SMOOTHING_SIGMA: f32 = 1.0;

/// A grayscale face crop.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap grayscale bytes, validating the buffer length.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        let is_dark = is_dark_frame(&data, DEFAULT_DARK_THRESHOLD);
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        })
    }

    /// Convert a decoded image to an 8-bit grayscale frame. Colour pixels
    /// become the unweighted integer mean of their channels; alpha is dropped.
    pub fn from_image(image: &DynamicImage, sequence: u32) -> Self {
        let (width, height, data) = if image.color().has_color() {
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();
            let data: Vec<u8> = rgb
                .pixels()
                .map(|p| ((p[0] as u16 + p[1] as u16 + p[2] as u16) / 3) as u8)
                .collect();
            (width, height, data)
        } else {
            let gray = image.to_luma8();
            let (width, height) = gray.dimensions();
            (width, height, gray.into_raw())
        };
        let is_dark = is_dark_frame(&data, DEFAULT_DARK_THRESHOLD);
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Copy out a rectangular region, e.g. a detected face box.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Frame, FrameError> {
        let fits = x.checked_add(width).is_some_and(|r| r <= self.width)
            && y.checked_add(height).is_some_and(|b| b <= self.height);
        if !fits {
            return Err(FrameError::CropOutOfBounds {
                x,
                y,
                width,
                height,
                frame_width: self.width,
                frame_height: self.height,
            });
        }
        let w = self.width as usize;
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * w + x as usize;
            data.extend_from_slice(&self.data[start..start + width as usize]);
        }
        Frame::from_gray(data, width, height, self.sequence)
    }

    /// Histogram equalization followed by a light Gaussian blur.
    pub fn preprocess(&self) -> Frame {
        let Some(gray) = GrayImage::from_raw(self.width, self.height, self.data.clone()) else {
            tracing::warn!(
                width = self.width,
                height = self.height,
                len = self.data.len(),
                "frame buffer does not match its dimensions; skipping preprocessing"
            );
            return self.clone();
        };
        let equalized = imageproc::contrast::equalize_histogram(&gray);
        let smoothed = imageproc::filter::gaussian_blur_f32(&equalized, SMOOTHING_SIGMA);
        Frame {
            data: smoothed.into_raw(),
            ..self.clone()
        }
    }

    /// Hand the frame to the descriptor extractor.
    pub fn to_sample(&self) -> FaceSample {
        FaceSample::gray(self.data.clone(), self.width, self.height)
    }
}

/// Check if a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_LEVEL).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("crop {width}x{height}+{x}+{y} exceeds {frame_width}x{frame_height} frame")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> Frame {
        // Low-contrast horizontal ramp, 100..=109.
        let data = (0..height)
            .flat_map(|_| (0..width).map(move |x| 100 + (x * 10 / width) as u8))
            .collect();
        Frame::from_gray(data, width, height, 0).unwrap()
    }

    fn stddev(data: &[u8]) -> f32 {
        let n = data.len() as f32;
        let mean = data.iter().map(|&b| b as f32).sum::<f32>() / n;
        let variance = data.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n;
        variance.sqrt()
    }

    #[test]
    fn test_from_gray_rejects_bad_length() {
        assert!(matches!(
            Frame::from_gray(vec![0; 10], 4, 4, 0),
            Err(FrameError::InvalidLength { expected: 16, actual: 10 })
        ));
    }

    #[test]
    fn test_from_image_uses_luma() {
        let rgb = image::RgbImage::from_pixel(30, 20, image::Rgb([90, 90, 90]));
        let frame = Frame::from_image(&DynamicImage::ImageRgb8(rgb), 3);
        assert_eq!((frame.width, frame.height, frame.sequence), (30, 20, 3));
        assert!(frame.data.iter().all(|&p| p == 90));
        assert!(!frame.is_dark);
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::from_gray(vec![10, 20, 30, 40], 2, 2, 0).unwrap();
        assert_eq!(frame.avg_brightness(), 25.0);
    }

    #[test]
    fn test_from_image_unweighted_channel_mean() {
        let rgb = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 0, 100]));
        let frame = Frame::from_image(&DynamicImage::ImageRgb8(rgb), 0);
        assert!(frame.data.iter().all(|&p| p == 100));

        let rgba = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 31, 0]));
        let frame = Frame::from_image(&DynamicImage::ImageRgba8(rgba), 0);
        assert!(frame.data.iter().all(|&p| p == 20));
    }

    #[test]
    fn test_crop() {
        let data: Vec<u8> = (0..16).collect();
        let frame = Frame::from_gray(data, 4, 4, 0).unwrap();
        let crop = frame.crop(1, 2, 2, 2).unwrap();
        assert_eq!(crop.data, vec![9, 10, 13, 14]);
        assert_eq!((crop.width, crop.height), (2, 2));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let frame = Frame::from_gray(vec![0; 16], 4, 4, 0).unwrap();
        assert!(matches!(frame.crop(3, 0, 2, 2), Err(FrameError::CropOutOfBounds { .. })));
        assert!(frame.crop(u32::MAX, 0, 2, 2).is_err());
    }

    #[test]
    fn test_preprocess_increases_contrast() {
        let frame = ramp(48, 48);
        let processed = frame.preprocess();
        assert_eq!(processed.data.len(), frame.data.len());
        let (before, after) = (stddev(&frame.data), stddev(&processed.data));
        assert!(after > before, "contrast should grow: {before:.2} -> {after:.2}");
    }

    #[test]
    fn test_to_sample_shape() {
        let sample = ramp(30, 28).to_sample();
        assert_eq!((sample.width, sample.height, sample.channels), (30, 28, 1));
        assert_eq!(sample.data.len(), 30 * 28);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → should NOT be dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, 0.95));
    }
}
