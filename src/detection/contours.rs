use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::edges::canny;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use tracing::debug;

use crate::config::LocatorConfig;
use crate::models::{intersect_lines, Point2, QuadCorners};

/// Finds the card's four-corner boundary in a preprocessed grayscale image.
#[derive(Debug, Clone, Default)]
pub struct ContourLocator {
    config: LocatorConfig,
}

impl ContourLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Binary edge map of the working image.
    pub fn detect_edges(&self, gray: &GrayImage) -> GrayImage {
        canny(gray, self.config.canny_low, self.config.canny_high)
    }

    /// Locate the card boundary, or None when no contour reduces to four vertices.
    pub fn locate(&self, gray: &GrayImage) -> Option<QuadCorners> {
        let edges = self.detect_edges(gray);
        self.locate_in_edges(&edges)
    }

    /// Search an edge map for the largest contour that approximates to a quadrilateral.
    pub fn locate_in_edges(&self, edges: &GrayImage) -> Option<QuadCorners> {
        let min_area = self.config.min_area_fraction * f64::from(edges.width()) * f64::from(edges.height());
        let mut contours = external_contours(edges);
        debug!(count = contours.len(), min_area, "External contours found");

        contours.sort_by(|a, b| b.area.total_cmp(&a.area));

        for (rank, contour) in contours.iter().enumerate() {
            let outline = arc_length(&contour.points, true);
            let epsilon = self.config.epsilon_factor * outline;
            let Some(polygon) = approximate_closed(&contour.points, epsilon) else {
                continue;
            };
            if polygon.len() != 4 {
                continue;
            }

            let rough = QuadCorners::new([polygon[0], polygon[1], polygon[2], polygon[3]]);
            let quad = refine_sides(&contour.points, &rough, (epsilon / 4.0).max(2.0)).unwrap_or(rough);

            if !quad.is_convex() || !quad.ordered().is_distinct() {
                debug!(rank, corners = ?quad.points(), "Skipping degenerate quadrilateral");
                continue;
            }
            if f64::from(quad.area()) < min_area {
                debug!(rank, area = quad.area(), "Skipping undersized quadrilateral");
                continue;
            }
            let perimeter = f64::from(quad.perimeter());
            if outline > self.config.max_outline_ratio * perimeter {
                debug!(rank, outline, perimeter, "Skipping ragged outline");
                continue;
            }

            debug!(rank, area = contour.area, corners = ?quad.points(), "Card boundary found");
            return Some(quad);
        }

        debug!("No contour approximates to four vertices");
        None
    }
}

/// Douglas-Peucker on a closed contour.
///
/// The contour is split at two far-apart points, one being the farthest from
/// the centroid, and each half is simplified as an open curve. Both split
/// points are extreme points of the outline, so neither lands mid-side.
fn approximate_closed(points: &[Point<i32>], epsilon: f64) -> Option<Vec<Point2>> {
    if points.len() < 4 || !(epsilon > 0.0) {
        return None;
    }

    let n = points.len() as f64;
    let cx = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;
    let cy = points.iter().map(|p| f64::from(p.y)).sum::<f64>() / n;
    let start = farthest_from(points, cx, cy)?;

    let ring: Vec<Point<i32>> = points[start..].iter().chain(&points[..start]).copied().collect();
    let anchor = ring[0];
    let split = farthest_from(&ring, f64::from(anchor.x), f64::from(anchor.y))?;
    if split == 0 {
        return None;
    }

    let mut back: Vec<Point<i32>> = ring[split..].to_vec();
    back.push(anchor);

    let mut polygon = approximate_polygon_dp(&ring[..=split], epsilon, false);
    let second = approximate_polygon_dp(&back, epsilon, false);
    // Drop the shared split point and the closing anchor.
    polygon.pop();
    polygon.extend_from_slice(&second[..second.len() - 1]);

    Some(polygon.iter().map(|p| Point2::new(p.x as f32, p.y as f32)).collect())
}

fn farthest_from(points: &[Point<i32>], x: f64, y: f64) -> Option<usize> {
    points
        .iter()
        .map(|p| (f64::from(p.x) - x).powi(2) + (f64::from(p.y) - y).powi(2))
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Refit each side of `quad` to the contour pixels running along it and
/// intersect neighbouring sides.
///
/// Only pixels within `tolerance` of a side and away from its ends take part,
/// so rounded or clipped corners do not pull the fit.
fn refine_sides(points: &[Point<i32>], quad: &QuadCorners, tolerance: f64) -> Option<QuadCorners> {
    let corners = quad.points();
    let mut sides = [(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)); 4];

    for (i, side) in sides.iter_mut().enumerate() {
        let (a, b) = (corners[i], corners[(i + 1) % 4]);
        let support: Vec<(f64, f64)> = points
            .iter()
            .map(|p| (f64::from(p.x), f64::from(p.y)))
            .filter(|p| along_side(*p, a, b, tolerance))
            .collect();
        *side = fit_line(&support)?;
    }

    let mut refined = [Point2::new(0.0, 0.0); 4];
    for (i, corner) in refined.iter_mut().enumerate() {
        *corner = intersect_lines(sides[(i + 3) % 4], sides[i])?;
    }
    Some(QuadCorners::new(refined))
}

fn along_side(p: (f64, f64), a: Point2, b: Point2, tolerance: f64) -> bool {
    let (ax, ay) = (f64::from(a.x), f64::from(a.y));
    let (dx, dy) = (f64::from(b.x) - ax, f64::from(b.y) - ay);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return false;
    }
    let (px, py) = (p.0 - ax, p.1 - ay);
    let t = (px * dx + py * dy) / len_sq;
    let distance = (px * dy - py * dx).abs() / len_sq.sqrt();
    (SIDE_SPAN.0..=SIDE_SPAN.1).contains(&t) && distance <= tolerance
}

/// Portion of each side used for refitting.
const SIDE_SPAN: (f64, f64) = (0.1, 0.9);

/// Total least squares line through the points, as (centroid, unit direction).
fn fit_line(points: &[(f64, f64)]) -> Option<(Point2, Point2)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det_part = (cov_xx - cov_yy) * (cov_xx - cov_yy) + 4.0 * cov_xy * cov_xy;
    let lambda = 0.5 * (trace + det_part.max(0.0).sqrt());
    let (mut ux, mut uy) = (cov_xy, lambda - cov_xx);
    let norm = (ux * ux + uy * uy).sqrt();
    if norm <= 1e-12 {
        (ux, uy) = (1.0, 0.0);
    } else {
        ux /= norm;
        uy /= norm;
    }

    Some((Point2::new(mx as f32, my as f32), Point2::new(ux as f32, uy as f32)))
}

/// An outermost contour and the area it encloses.
#[derive(Debug, Clone)]
pub struct ExternalContour {
    pub points: Vec<Point<i32>>,
    pub area: f64,
}

/// Outer borders that are not nested inside any other border.
pub fn external_contours(edges: &GrayImage) -> Vec<ExternalContour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c: &Contour<i32>| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            let area = polygon_area(&c.points);
            ExternalContour {
                points: c.points,
                area,
            }
        })
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    twice_area.abs() as f64 / 2.0
}
