use image::{DynamicImage, GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::{debug, info, warn};

use crate::config::CenteringConfig;
use crate::models::{BorderMeasurement, CenteringReport, RectifiedImage};
use crate::pipeline::DebugObserver;

const FOREGROUND: u8 = 255;

/// Measures how evenly the printed region sits inside the card border.
#[derive(Debug, Clone, Default)]
pub struct CenteringMeasurer {
    config: CenteringConfig,
}

impl CenteringMeasurer {
    pub fn new(config: CenteringConfig) -> Self {
        Self { config }
    }

    pub fn measure(&self, card: &RectifiedImage, observer: Option<&dyn DebugObserver>) -> CenteringReport {
        let gray = card.to_gray();
        let (mean, std_dev) = intensity_stats(&gray);
        debug!(mean, std_dev, "Rectified card intensity");

        let mut offset = self.config.offset;
        let mut bounds = self.segment(&gray, offset, observer);

        if bounds.is_none() {
            info!(
                offset,
                fallback = self.config.fallback_offset,
                "No foreground pixels; retrying with fallback threshold offset"
            );
            offset = self.config.fallback_offset;
            bounds = self.segment(&gray, offset, observer);
        }

        let Some(bounds) = bounds else {
            warn!("No printed region found in the card");
            return CenteringReport {
                borders: None,
                offset,
                score: 0.0,
            };
        };

        let borders = bounds.borders(gray.width(), gray.height());
        let score = borders.score();
        debug!(
            ?bounds,
            top = borders.top,
            bottom = borders.bottom,
            left = borders.left,
            right = borders.right,
            horizontal = borders.horizontal_ratio(),
            vertical = borders.vertical_ratio(),
            score,
            "Centering measured"
        );

        CenteringReport {
            borders: Some(borders),
            offset,
            score,
        }
    }

    fn segment(&self, gray: &GrayImage, offset: i32, observer: Option<&dyn DebugObserver>) -> Option<Bounds> {
        let mask = adaptive_threshold_inv(gray, self.config.block_size, offset);
        let bounds = foreground_bounds(&mask);
        debug!(offset, count = bounds.map_or(0, |b| b.count), "Adaptive threshold applied");

        if let Some(observer) = observer {
            observer.observe(&format!("threshold_c{offset}"), &DynamicImage::ImageLuma8(mask));
        }
        bounds
    }
}

/// Binary-inverse adaptive threshold against the local mean.
///
/// A pixel is foreground (255) when it is at least `offset` darker than the
/// mean of the `block_size` x `block_size` window around it, clipped to the
/// image.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = integral_image::<_, u64>(gray);
    let radius = block_size / 2;

    GrayImage::from_fn(width, height, |x, y| {
        let mean = region_mean(&integral, width, height, x, y, radius);
        let value = f64::from(gray.get_pixel(x, y)[0]);
        if value <= mean - f64::from(offset) {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Mean of the window of `radius` around (cx, cy), clipped to the image.
fn region_mean(integral: &Image<Luma<u64>>, width: u32, height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let left = cx.saturating_sub(radius);
    let top = cy.saturating_sub(radius);
    let right = cx.saturating_add(radius).min(width - 1);
    let bottom = cy.saturating_add(radius).min(height - 1);

    let area = f64::from(right - left + 1) * f64::from(bottom - top + 1);
    let [sum] = sum_image_pixels(integral, left, top, right, bottom);
    sum as f64 / area
}

/// Inclusive bounding box of the foreground pixels in a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub count: u64,
}

impl Bounds {
    /// Border widths for an image of the given size.
    pub fn borders(&self, width: u32, height: u32) -> BorderMeasurement {
        BorderMeasurement {
            top: self.min_y,
            bottom: height - self.max_y,
            left: self.min_x,
            right: width - self.max_x,
        }
    }
}

pub fn foreground_bounds(mask: &GrayImage) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] != FOREGROUND {
            continue;
        }
        bounds = Some(match bounds {
            None => Bounds { min_x: x, min_y: y, max_x: x, max_y: y, count: 1 },
            Some(b) => Bounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
                count: b.count + 1,
            },
        });
    }
    bounds
}

fn intensity_stats(gray: &GrayImage) -> (f64, f64) {
    let n = f64::from(gray.width()) * f64::from(gray.height());
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = gray.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
    let variance = gray.pixels().map(|p| (f64::from(p[0]) - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
