use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::error::GradeError;
use crate::models::{QuadCorners, RectifiedImage};

/// Fill for output pixels whose pre-image falls outside the photo.
const OUTSIDE: Rgb<u8> = Rgb([0, 0, 0]);

/// Warps a located quadrilateral into an axis-aligned top-down image.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerspectiveRectifier {
    inset: f32,
}

impl PerspectiveRectifier {
    /// Warps exactly the given quadrilateral.
    pub fn new() -> Self {
        Self { inset: 0.0 }
    }

    /// Pull every side `inset` pixels inward before warping.
    pub fn with_inset(mut self, inset: f32) -> Self {
        self.inset = inset;
        self
    }

    pub fn rectify(&self, image: &RgbImage, corners: &QuadCorners) -> Result<RectifiedImage, GradeError> {
        let quad = corners.ordered();
        if !quad.is_distinct() {
            return Err(GradeError::DegenerateQuad);
        }
        let quad = if self.inset > 0.0 {
            quad.inset(self.inset).ok_or(GradeError::DegenerateQuad)?
        } else {
            quad
        };
        let (width, height) = quad.target_size();
        debug!(width, height, corners = ?quad, "Rectifying card");

        if width == 0 || height == 0 {
            return Err(GradeError::DegenerateQuad);
        }

        let (w, h) = ((width - 1) as f32, (height - 1) as f32);
        let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        // Maps photo coordinates onto the flat card; warp_into samples through its inverse.
        let projection =
            Projection::from_control_points(quad.control_points(), dest).ok_or(GradeError::DegenerateQuad)?;

        let mut output = RgbImage::new(width, height);
        warp_into(image, &projection, Interpolation::Bilinear, OUTSIDE, &mut output);

        Ok(RectifiedImage::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point2;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = (x + y) as u8;
            Rgb([v, v / 2, 255 - v])
        })
    }

    fn quad(points: [(f32, f32); 4]) -> QuadCorners {
        QuadCorners::new(points.map(|(x, y)| Point2::new(x, y)))
    }

    #[test]
    fn test_axis_aligned_region_is_preserved() {
        let image = gradient(120, 100);
        let corners = quad([(10.0, 10.0), (90.0, 10.0), (90.0, 70.0), (10.0, 70.0)]);

        let card = PerspectiveRectifier::new().rectify(&image, &corners).expect("rectify");
        assert_eq!((card.width(), card.height()), (80, 60));

        for y in 0..card.height() {
            for x in 0..card.width() {
                let got = card.as_rgb().get_pixel(x, y);
                let want = image.get_pixel(10 + x, 10 + y);
                for c in 0..3 {
                    let diff = (i16::from(got[c]) - i16::from(want[c])).abs();
                    assert!(diff <= 3, "({x}, {y}) channel {c}: {got:?} vs {want:?}");
                }
            }
        }
    }

    #[test]
    fn test_corner_order_does_not_matter() {
        let image = gradient(120, 100);
        let a = quad([(10.0, 10.0), (90.0, 12.0), (88.0, 70.0), (12.0, 68.0)]);
        let b = quad([(88.0, 70.0), (10.0, 10.0), (12.0, 68.0), (90.0, 12.0)]);

        let rectifier = PerspectiveRectifier::new();
        let first = rectifier.rectify(&image, &a).expect("rectify");
        let second = rectifier.rectify(&image, &b).expect("rectify");
        assert_eq!(first.as_rgb(), second.as_rgb());
    }

    #[test]
    fn test_trapezoid_is_straightened() {
        // Dark trapezoid (wider at the bottom) inside a light photo.
        let image = RgbImage::from_fn(200, 200, |x, y| {
            let (xf, yf) = (x as f32, y as f32);
            let t = (yf - 40.0) / 120.0;
            let left = 60.0 - 30.0 * t;
            let right = 140.0 + 30.0 * t;
            if (40.0..=160.0).contains(&yf) && xf >= left && xf <= right {
                Rgb([40, 40, 40])
            } else {
                Rgb([220, 220, 220])
            }
        });
        let corners = quad([(60.0, 40.0), (140.0, 40.0), (170.0, 160.0), (30.0, 160.0)]);

        let card = PerspectiveRectifier::new().rectify(&image, &corners).expect("rectify");
        // Longest horizontal edge is the bottom (140 px), vertical edges ~123.7 px.
        assert_eq!((card.width(), card.height()), (140, 123));

        // Every interior sample of the flattened card lies inside the trapezoid.
        for y in 4..card.height() - 4 {
            for x in 4..card.width() - 4 {
                let value = card.as_rgb().get_pixel(x, y)[0];
                assert!(value <= 45, "({x}, {y}) = {value}");
            }
        }
    }

    #[test]
    fn test_inset_drops_the_outer_rim() {
        let image = gradient(120, 100);
        let corners = quad([(10.0, 10.0), (90.0, 10.0), (90.0, 70.0), (10.0, 70.0)]);

        let card = PerspectiveRectifier::new().with_inset(2.0).rectify(&image, &corners).expect("rectify");
        assert_eq!((card.width(), card.height()), (76, 56));
        for ((x, y), (sx, sy)) in [((0, 0), (12, 12)), ((75, 0), (88, 12)), ((75, 55), (88, 68))] {
            let (got, want) = (card.as_rgb().get_pixel(x, y), image.get_pixel(sx, sy));
            for c in 0..3 {
                let diff = (i16::from(got[c]) - i16::from(want[c])).abs();
                assert!(diff <= 3, "({x}, {y}) channel {c}: {got:?} vs {want:?}");
            }
        }
    }

    #[test]
    fn test_repeated_corner_is_degenerate() {
        let image = gradient(50, 50);
        let corners = quad([(40.0, 20.0), (40.0, 20.0), (42.0, 23.0), (38.0, 22.0)]);
        let err = PerspectiveRectifier::new().rectify(&image, &corners).unwrap_err();
        assert!(matches!(err, GradeError::DegenerateQuad));
    }

    #[test]
    fn test_collapsed_quad_is_degenerate() {
        let image = gradient(50, 50);
        let corners = quad([(10.0, 10.0), (10.0, 10.0), (10.0, 10.0), (10.0, 10.0)]);
        let err = PerspectiveRectifier::new().rectify(&image, &corners).unwrap_err();
        assert!(matches!(err, GradeError::DegenerateQuad));
    }
}
