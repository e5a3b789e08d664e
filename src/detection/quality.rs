//! Corner, edge and surface condition checks.
//!
//! Real defect detectors are not implemented yet; each check reports a
//! perfect score. They sit behind [`QualityCheck`] so a detector can replace
//! a placeholder without touching the aggregator.

use image::{GenericImageView, GrayImage};
use tracing::debug;

use crate::models::RectifiedImage;

/// Score reported by the placeholder checks.
pub const PLACEHOLDER_SCORE: f64 = 1.0;

/// A condition check run on the flattened card.
pub trait QualityCheck: Send + Sync {
    /// Returns the name of this check.
    fn name(&self) -> &'static str;

    /// Condition of the card in [0, 1], 1.0 being flawless.
    fn score(&self, card: &RectifiedImage) -> f64;
}

/// Corner sharpness and whitening.
#[derive(Debug, Clone)]
pub struct CornerCheck {
    /// Side of the square region examined at each corner, in pixels.
    pub corner_size: u32,
}

impl Default for CornerCheck {
    fn default() -> Self {
        Self { corner_size: 20 }
    }
}

impl CornerCheck {
    /// The four corner regions as (x, y, width, height), clipped to the card.
    fn regions(&self, card: &RectifiedImage) -> [(u32, u32, u32, u32); 4] {
        let (w, h) = (card.width(), card.height());
        let sw = self.corner_size.min(w);
        let sh = self.corner_size.min(h);
        [(0, 0, sw, sh), (w - sw, 0, sw, sh), (w - sw, h - sh, sw, sh), (0, h - sh, sw, sh)]
    }

    /// Mean gray level of each corner region, clockwise from top-left.
    fn region_means(&self, card: &RectifiedImage) -> [f64; 4] {
        let gray = card.to_gray();
        self.regions(card).map(|region| mean_gray(&gray, region))
    }
}

fn mean_gray(gray: &GrayImage, (x, y, width, height): (u32, u32, u32, u32)) -> f64 {
    let count = u64::from(width) * u64::from(height);
    if count == 0 {
        return 0.0;
    }
    let total: u64 = gray
        .view(x, y, width, height)
        .pixels()
        .map(|(_, _, p)| u64::from(p[0]))
        .sum();
    total as f64 / count as f64
}

impl QualityCheck for CornerCheck {
    fn name(&self) -> &'static str {
        "corners"
    }

    fn score(&self, card: &RectifiedImage) -> f64 {
        let [top_left, top_right, bottom_right, bottom_left] = self.region_means(card);
        debug!(top_left, top_right, bottom_right, bottom_left, "Corner region brightness");
        PLACEHOLDER_SCORE
    }
}

/// Edge whitening and chipping.
#[derive(Debug, Clone, Default)]
pub struct EdgeCheck;

impl QualityCheck for EdgeCheck {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn score(&self, _card: &RectifiedImage) -> f64 {
        PLACEHOLDER_SCORE
    }
}

/// Scratches and print defects on the face.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCheck;

impl QualityCheck for SurfaceCheck {
    fn name(&self) -> &'static str {
        "surface"
    }

    fn score(&self, _card: &RectifiedImage) -> f64 {
        PLACEHOLDER_SCORE
    }
}
