//! Tuning parameters for every grading stage.
//!
//! All values have defaults, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! [locator]
//! canny_low = 40.0
//!
//! [centering]
//! block_size = 21
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub preprocess: PreprocessConfig,
    pub locator: LocatorConfig,
    pub rectify: RectifyConfig,
    pub centering: CenteringConfig,
    pub weights: GradeWeights,
}

/// Grayscale conversion, denoising and exposure correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gaussian sigma of the denoising blur (0.8 matches a 3x3 kernel).
    pub blur_sigma: f32,
    /// Mean brightness (0-255) at or above which the photo counts as overexposed.
    pub overexposure_threshold: f64,
    /// Gamma used to darken overexposed photos.
    pub gamma: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 0.8,
            overexposure_threshold: 250.0,
            gamma: 0.5,
        }
    }
}

/// Card boundary search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
    /// Polygon approximation tolerance as a fraction of contour perimeter.
    pub epsilon_factor: f64,
    /// Smallest accepted card, as a fraction of the photo's area.
    pub min_area_fraction: f64,
    /// Longest accepted contour, as a multiple of the fitted quadrilateral's
    /// perimeter. Ragged outlines such as noise run far longer than their hull.
    pub max_outline_ratio: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            epsilon_factor: 0.02,
            min_area_fraction: 0.05,
            max_outline_ratio: 1.25,
        }
    }
}

/// Perspective correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// Pixels each side of the located boundary is pulled inward before
    /// warping. The boundary follows the outer rim of the two-pixel edge
    /// band, one pixel into the background.
    pub edge_inset: f32,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self { edge_inset: 2.0 }
    }
}

/// Adaptive thresholding of the printed region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteringConfig {
    /// Side of the square neighbourhood used for the local mean (odd).
    pub block_size: u32,
    /// Constant subtracted from the local mean.
    pub offset: i32,
    /// Offset for the second attempt when the first finds no foreground.
    pub fallback_offset: i32,
}

impl Default for CenteringConfig {
    fn default() -> Self {
        Self {
            block_size: 15,
            offset: 3,
            fallback_offset: -2,
        }
    }
}

/// Weights of the sub-scores in the composite grade. Must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeWeights {
    pub centering: f64,
    pub corners: f64,
    pub edges: f64,
    pub surface: f64,
}

impl Default for GradeWeights {
    fn default() -> Self {
        Self {
            centering: 0.4,
            corners: 0.2,
            edges: 0.2,
            surface: 0.2,
        }
    }
}

impl GradeWeights {
    fn total(&self) -> f64 {
        self.centering + self.corners + self.edges + self.surface
    }
}

impl GradingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check that every value is usable by the stage that consumes it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: String| Err(ConfigError::Invalid { field, reason });

        let pre = &self.preprocess;
        if !(pre.blur_sigma > 0.0) {
            return invalid("preprocess.blur_sigma", format!("must be positive, got {}", pre.blur_sigma));
        }
        if !(pre.gamma > 0.0) {
            return invalid("preprocess.gamma", format!("must be positive, got {}", pre.gamma));
        }

        let loc = &self.locator;
        if !(loc.canny_low >= 0.0) || loc.canny_low > loc.canny_high {
            return invalid(
                "locator.canny_low",
                format!("must be in 0..=canny_high ({}), got {}", loc.canny_high, loc.canny_low),
            );
        }
        if !(loc.epsilon_factor > 0.0) {
            return invalid(
                "locator.epsilon_factor",
                format!("must be positive, got {}", loc.epsilon_factor),
            );
        }

        if !(0.0..1.0).contains(&loc.min_area_fraction) {
            return invalid(
                "locator.min_area_fraction",
                format!("must be in 0..1, got {}", loc.min_area_fraction),
            );
        }

        if !(loc.max_outline_ratio >= 1.0) {
            return invalid(
                "locator.max_outline_ratio",
                format!("must be at least 1, got {}", loc.max_outline_ratio),
            );
        }

        let inset = self.rectify.edge_inset;
        if !(inset >= 0.0) {
            return invalid("rectify.edge_inset", format!("must be non-negative, got {inset}"));
        }

        let block = self.centering.block_size;
        if block < 3 || block % 2 == 0 {
            return invalid("centering.block_size", format!("must be odd and >= 3, got {block}"));
        }

        let w = &self.weights;
        for (field, value) in [
            ("weights.centering", w.centering),
            ("weights.corners", w.corners),
            ("weights.edges", w.edges),
            ("weights.surface", w.surface),
        ] {
            if !(value >= 0.0) {
                return invalid(field, format!("must be non-negative, got {value}"));
            }
        }
        if (w.total() - 1.0).abs() > 1e-6 {
            return invalid("weights", format!("must sum to 1.0, got {}", w.total()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GradingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.centering.block_size, 15);
        assert_eq!(config.centering.offset, 3);
        assert_eq!(config.centering.fallback_offset, -2);
        assert_eq!(config.locator.canny_low, 50.0);
        assert_eq!(config.locator.canny_high, 150.0);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = GradingConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config, GradingConfig::default());
    }

    #[test]
    fn test_parse_partial_section() {
        let toml = r"
[locator]
canny_low = 40.0

[centering]
block_size = 21
";
        let config = GradingConfig::from_toml_str(toml).expect("parse partial config");
        assert_eq!(config.locator.canny_low, 40.0);
        assert_eq!(config.locator.canny_high, 150.0);
        assert_eq!(config.centering.block_size, 21);
        assert_eq!(config.centering.offset, 3);
    }

    #[test]
    fn test_even_block_size_rejected() {
        let err = GradingConfig::from_toml_str("[centering]\nblock_size = 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "centering.block_size", .. }));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let toml = "[weights]\ncentering = 0.5\n";
        let err = GradingConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"), "{err}");
    }

    #[test]
    fn test_inverted_canny_thresholds_rejected() {
        let toml = "[locator]\ncanny_low = 200.0\n";
        assert!(GradingConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_locator_and_rectify_bounds() {
        let config = GradingConfig::default();
        assert_eq!(config.locator.min_area_fraction, 0.05);
        assert_eq!(config.rectify.edge_inset, 2.0);

        let err = GradingConfig::from_toml_str("[locator]\nmin_area_fraction = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "locator.min_area_fraction", .. }));

        let err = GradingConfig::from_toml_str("[locator]\nmax_outline_ratio = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "locator.max_outline_ratio", .. }));

        let err = GradingConfig::from_toml_str("[rectify]\nedge_inset = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "rectify.edge_inset", .. }));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = GradingConfig::from_toml_str("[centering\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GradingConfig::load(Path::new("/nonexistent/mintcheck.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
