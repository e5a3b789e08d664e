use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// A 2D point in image coordinates (x to the right, y downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    fn as_tuple(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// Four card corners in detection order (not yet labelled).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadCorners {
    points: [Point2; 4],
}

impl QuadCorners {
    pub fn new(points: [Point2; 4]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point2; 4] {
        &self.points
    }

    /// True when the polygon p0-p1-p2-p3 is a proper quadrilateral: four
    /// distinct corners, no three consecutive ones collinear, and no edges
    /// crossing.
    ///
    /// Only the two pairs of opposite edges can intersect in a quadrilateral.
    pub fn is_simple(&self) -> bool {
        let [a, b, c, d] = self.points;
        !self.is_degenerate() && !segments_cross(a, b, c, d) && !segments_cross(b, c, d, a)
    }

    /// True when every corner turns the same way.
    pub fn is_convex(&self) -> bool {
        let turns = turns(&self.points);
        !self.is_degenerate() && (turns.iter().all(|t| *t > 0.0) || turns.iter().all(|t| *t < 0.0))
    }

    /// Enclosed area (shoelace), zero for collapsed quads.
    pub fn area(&self) -> f32 {
        signed_area(&self.points).abs()
    }

    /// Total length of the four sides.
    pub fn perimeter(&self) -> f32 {
        let p = &self.points;
        (0..4).map(|i| p[i].distance(&p[(i + 1) % 4])).sum()
    }

    fn is_degenerate(&self) -> bool {
        let p = &self.points;
        (0..4).any(|i| {
            let (a, b, c) = (p[(i + 3) % 4], p[i], p[(i + 1) % 4]);
            let (ab, bc) = (a.distance(&b), b.distance(&c));
            ab < MIN_SIDE || bc < MIN_SIDE || orientation(a, b, c).abs() <= MIN_TURN_SIN * ab * bc
        })
    }

    /// Label the corners as (top-left, top-right, bottom-right, bottom-left).
    ///
    /// Top-left has the smallest x+y and bottom-right the largest; top-right
    /// has the smallest y-x and bottom-left the largest. This assumes the card
    /// is roughly upright: past ~45 degrees of rotation the labels shift.
    pub fn ordered(&self) -> OrderedQuad {
        let pick = |key: fn(&Point2) -> f32, largest: bool| -> Point2 {
            let mut best = self.points[0];
            for p in &self.points[1..] {
                let better = if largest { key(p) > key(&best) } else { key(p) < key(&best) };
                if better {
                    best = *p;
                }
            }
            best
        };

        OrderedQuad {
            top_left: pick(|p| p.x + p.y, false),
            top_right: pick(|p| p.y - p.x, false),
            bottom_right: pick(|p| p.x + p.y, true),
            bottom_left: pick(|p| p.y - p.x, true),
        }
    }
}

/// Sides shorter than this collapse two corners into one.
const MIN_SIDE: f32 = 0.5;
/// Sine of the smallest turn at a corner that still counts as a corner.
const MIN_TURN_SIN: f32 = 1e-3;

fn signed_area(points: &[Point2; 4]) -> f32 {
    (0..4)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % 4]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f32>()
        / 2.0
}

fn turns(points: &[Point2; 4]) -> [f32; 4] {
    std::array::from_fn(|i| orientation(points[(i + 3) % 4], points[i], points[(i + 1) % 4]))
}

fn orientation(a: Point2, b: Point2, c: Point2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper intersection test for segments ab and cd.
fn segments_cross(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Corners labelled in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderedQuad {
    pub top_left: Point2,
    pub top_right: Point2,
    pub bottom_right: Point2,
    pub bottom_left: Point2,
}

impl OrderedQuad {
    pub fn as_array(&self) -> [Point2; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// True when the labelling picked four different points.
    pub fn is_distinct(&self) -> bool {
        let p = self.as_array();
        (0..4).all(|i| ((i + 1)..4).all(|j| p[i].distance(&p[j]) >= MIN_SIDE))
    }

    /// Move every side `distance` pixels towards the interior.
    ///
    /// None when two neighbouring sides are parallel.
    pub fn inset(&self, distance: f32) -> Option<OrderedQuad> {
        let p = self.as_array();
        let sign = signed_area(&p).signum();
        if sign == 0.0 {
            return None;
        }

        // Each side as (point on the shifted line, direction).
        let sides: [(Point2, Point2); 4] = std::array::from_fn(|i| {
            let (a, b) = (p[i], p[(i + 1) % 4]);
            let len = a.distance(&b).max(f32::EPSILON);
            let dir = Point2::new((b.x - a.x) / len, (b.y - a.y) / len);
            let normal = Point2::new(-dir.y * sign, dir.x * sign);
            (Point2::new(a.x + normal.x * distance, a.y + normal.y * distance), dir)
        });

        let mut corners = [Point2::new(0.0, 0.0); 4];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = intersect_lines(sides[(i + 3) % 4], sides[i])?;
        }
        let [top_left, top_right, bottom_right, bottom_left] = corners;
        Some(OrderedQuad { top_left, top_right, bottom_right, bottom_left })
    }

    pub(crate) fn control_points(&self) -> [(f32, f32); 4] {
        self.as_array().map(|p| p.as_tuple())
    }

    /// Destination size: the longer of each pair of opposite edges,
    /// each length truncated to whole pixels first.
    pub fn target_size(&self) -> (u32, u32) {
        let top = self.top_left.distance(&self.top_right) as u32;
        let bottom = self.bottom_left.distance(&self.bottom_right) as u32;
        let left = self.top_left.distance(&self.bottom_left) as u32;
        let right = self.top_right.distance(&self.bottom_right) as u32;
        (top.max(bottom), left.max(right))
    }
}

/// Intersection of two lines given as (point, direction).
pub(crate) fn intersect_lines(first: (Point2, Point2), second: (Point2, Point2)) -> Option<Point2> {
    let ((p, u), (q, v)) = (first, second);
    let denom = u.x * v.y - u.y * v.x;
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = ((q.x - p.x) * v.y - (q.y - p.y) * v.x) / denom;
    Some(Point2::new(p.x + t * u.x, p.y + t * u.y))
}

/// A top-down view of the card, axis-aligned with its edges.
#[derive(Debug, Clone)]
pub struct RectifiedImage {
    image: RgbImage,
}

impl RectifiedImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image.clone())
    }
}

/// Distances from each image edge to the printed region's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BorderMeasurement {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl BorderMeasurement {
    pub fn horizontal_ratio(&self) -> f64 {
        border_ratio(self.left, self.right)
    }

    pub fn vertical_ratio(&self) -> f64 {
        border_ratio(self.top, self.bottom)
    }

    /// Mean of the horizontal and vertical ratios, 1.0 when centered.
    pub fn score(&self) -> f64 {
        (self.horizontal_ratio() + self.vertical_ratio()) / 2.0
    }
}

/// min/max of two opposing borders. Two zero borders count as centered.
pub fn border_ratio(a: u32, b: u32) -> f64 {
    let (lo, hi) = (a.min(b), a.max(b));
    if hi == 0 {
        return 1.0;
    }
    f64::from(lo) / f64::from(hi)
}

/// Outcome of the centering stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CenteringReport {
    /// None when no printed region could be isolated.
    pub borders: Option<BorderMeasurement>,
    /// Threshold offset that produced the foreground mask.
    pub offset: i32,
    pub score: f64,
}

/// Raw sub-scores, each expected in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub centering: f64,
    pub corners: f64,
    pub edges: f64,
    pub surface: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    #[serde(rename = "Centering")]
    pub centering: f64,
    #[serde(rename = "Corners")]
    pub corners: f64,
    #[serde(rename = "Edges")]
    pub edges: f64,
    #[serde(rename = "Surface")]
    pub surface: f64,
    #[serde(rename = "Grade")]
    pub grade: f64,
}

/// Result of grading one photo.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeOutcome {
    Graded(GradeResult),
    /// No four-corner boundary was found in the photo.
    CardNotFound,
}

impl GradeOutcome {
    pub fn result(&self) -> Option<&GradeResult> {
        match self {
            GradeOutcome::Graded(result) => Some(result),
            GradeOutcome::CardNotFound => None,
        }
    }
}
