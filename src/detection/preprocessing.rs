use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, info};

use crate::config::PreprocessConfig;
use crate::error::GradeError;

/// A photo ready for boundary detection.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// The photo as decoded, in RGB.
    pub original: RgbImage,
    /// Denoised, exposure-normalized grayscale.
    pub gray: GrayImage,
    pub gamma_corrected: bool,
}

/// Converts a photo to a denoised, exposure-corrected grayscale working image.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, img: &DynamicImage) -> Preprocessed {
        let gray = to_grayscale(img);
        let blurred = apply_blur(&gray, self.config.blur_sigma);

        let mean = mean_brightness(&blurred);
        debug!(mean, "Blurred grayscale brightness");

        let overexposed = mean >= self.config.overexposure_threshold;
        let gray = if overexposed {
            info!(mean, gamma = self.config.gamma, "Image is overexposed; applying gamma correction");
            gamma_correction(&blurred, self.config.gamma)
        } else {
            blurred
        };

        Preprocessed {
            original: img.to_rgb8(),
            gray,
            gamma_corrected: overexposed,
        }
    }
}

/// Open and decode an image file.
pub fn load_image(path: &Path) -> Result<DynamicImage, GradeError> {
    ImageReader::open(path)
        .map_err(|source| GradeError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| GradeError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(|source| GradeError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

pub fn mean_brightness(img: &GrayImage) -> f64 {
    let count = u64::from(img.width()) * u64::from(img.height());
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p[0])).sum();
    sum as f64 / count as f64
}

/// Remap every sample through `255 * (v / 255)^(1 / gamma)`.
pub fn gamma_correction(img: &GrayImage, gamma: f64) -> GrayImage {
    let inv_gamma = 1.0 / gamma;
    let table: Vec<u8> = (0..=255u8)
        .map(|v| ((f64::from(v) / 255.0).powf(inv_gamma) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = table[usize::from(pixel[0])];
    }
    out
}
