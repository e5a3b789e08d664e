use tracing::debug;

use crate::config::GradeWeights;
use crate::models::{GradeResult, SubScores};

/// Combines the sub-scores into a 1-10 grade.
#[derive(Debug, Clone, Default)]
pub struct GradeAggregator {
    weights: GradeWeights,
}

impl GradeAggregator {
    pub fn new(weights: GradeWeights) -> Self {
        Self { weights }
    }

    /// Weighted composite in [0, 1] mapped linearly onto 1-10, one decimal.
    pub fn aggregate(&self, scores: SubScores) -> GradeResult {
        let w = &self.weights;
        let weighted = w.centering * scores.centering
            + w.corners * scores.corners
            + w.edges * scores.edges
            + w.surface * scores.surface;
        let grade = round_one_decimal(1.0 + 9.0 * weighted);
        debug!(weighted, grade, "Final grade computed");

        GradeResult {
            centering: scores.centering,
            corners: scores.corners,
            edges: scores.edges,
            surface: scores.surface,
            grade,
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
