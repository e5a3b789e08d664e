use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, info, instrument, warn};

use crate::config::GradingConfig;
use crate::detection::centering::CenteringMeasurer;
use crate::detection::contours::ContourLocator;
use crate::detection::grading::GradeAggregator;
use crate::detection::perspective::PerspectiveRectifier;
use crate::detection::preprocessing::{load_image, Preprocessor};
use crate::detection::quality::{CornerCheck, EdgeCheck, QualityCheck, SurfaceCheck};
use crate::error::GradeError;
use crate::models::{GradeOutcome, GradeResult, RectifiedImage, SubScores};

/// Receives intermediate images while a card is graded.
///
/// Observers only look; nothing they do changes the grade.
pub trait DebugObserver: Send + Sync {
    fn observe(&self, stage: &str, image: &DynamicImage);
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Saves every observed image as `NN_<stage>.png` in one directory.
#[derive(Debug)]
pub struct DebugDump {
    dir: PathBuf,
    next: AtomicUsize,
}

impl DebugDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save(&self, stage: &str, image: &DynamicImage) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        let filename = format!("{:02}_{}.png", index, stage.to_lowercase().replace(' ', "_"));
        let output_path = self.dir.join(filename);
        image
            .save(&output_path)
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
        Ok(output_path)
    }
}

impl DebugObserver for DebugDump {
    fn observe(&self, stage: &str, image: &DynamicImage) {
        match self.save(stage, image) {
            Ok(path) => debug!("Debug: saved {}", path.display()),
            Err(e) => warn!(stage, "Debug output skipped: {e:#}"),
        }
    }
}

/// The full grading pipeline: preprocess, locate, rectify, measure, aggregate.
///
/// Holds configuration only, so one instance can grade any number of
/// images, concurrently if shared behind an `Arc`.
pub struct Grader {
    preprocessor: Preprocessor,
    locator: ContourLocator,
    rectifier: PerspectiveRectifier,
    centering: CenteringMeasurer,
    aggregator: GradeAggregator,
    corners: Box<dyn QualityCheck>,
    edges: Box<dyn QualityCheck>,
    surface: Box<dyn QualityCheck>,
    debug: Option<DebugConfig>,
}

impl Grader {
    pub fn new(config: &GradingConfig) -> Self {
        Self {
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            locator: ContourLocator::new(config.locator.clone()),
            rectifier: PerspectiveRectifier::new().with_inset(config.rectify.edge_inset),
            centering: CenteringMeasurer::new(config.centering.clone()),
            aggregator: GradeAggregator::new(config.weights.clone()),
            corners: Box::new(CornerCheck::default()),
            edges: Box::new(EdgeCheck),
            surface: Box::new(SurfaceCheck),
            debug: None,
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    pub fn with_corner_check(mut self, check: impl QualityCheck + 'static) -> Self {
        self.corners = Box::new(check);
        self
    }

    pub fn with_edge_check(mut self, check: impl QualityCheck + 'static) -> Self {
        self.edges = Box::new(check);
        self
    }

    pub fn with_surface_check(mut self, check: impl QualityCheck + 'static) -> Self {
        self.surface = Box::new(check);
        self
    }

    /// Debug dump for one image, in a subdirectory named after its file stem.
    fn debug_dump_for(&self, path: &Path) -> Option<DebugDump> {
        let debug = self.debug.as_ref()?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Some(DebugDump::new(debug.output_dir.join(stem)))
    }

    /// Decode an image file and grade it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn grade_path(&self, path: &Path) -> Result<GradeOutcome, GradeError> {
        let img = load_image(path)?;
        info!(width = img.width(), height = img.height(), "Image loaded");

        let dump = self.debug_dump_for(path);
        if let Some(dump) = &dump {
            dump.observe("input", &img);
        }
        self.grade_image(&img, dump.as_ref().map(|d| d as &dyn DebugObserver))
    }

    /// Grade a decoded photo.
    pub fn grade_image(
        &self,
        img: &DynamicImage,
        observer: Option<&dyn DebugObserver>,
    ) -> Result<GradeOutcome, GradeError> {
        let pre = self.preprocessor.process(img);
        if let Some(observer) = observer {
            observer.observe("grayscale", &DynamicImage::ImageLuma8(pre.gray.clone()));
        }

        let edges = self.locator.detect_edges(&pre.gray);
        if let Some(observer) = observer {
            observer.observe("edges", &DynamicImage::ImageLuma8(edges.clone()));
        }

        let Some(corners) = self.locator.locate_in_edges(&edges) else {
            warn!("Could not find a 4-corner contour. Is the card image clear?");
            return Ok(GradeOutcome::CardNotFound);
        };

        let card = self.rectifier.rectify(&pre.original, &corners)?;
        info!(width = card.width(), height = card.height(), "Card rectified");
        if let Some(observer) = observer {
            observer.observe("rectified", &card.to_dynamic());
        }

        Ok(GradeOutcome::Graded(self.grade_rectified(&card, observer)))
    }

    /// Grade a card that is already flat and cropped to its edges.
    pub fn grade_rectified(&self, card: &RectifiedImage, observer: Option<&dyn DebugObserver>) -> GradeResult {
        let centering = self.centering.measure(card, observer);
        let scores = SubScores {
            centering: centering.score,
            corners: run_check(self.corners.as_ref(), card),
            edges: run_check(self.edges.as_ref(), card),
            surface: run_check(self.surface.as_ref(), card),
        };

        let result = self.aggregator.aggregate(scores);
        info!(
            centering = result.centering,
            corners = result.corners,
            edges = result.edges,
            surface = result.surface,
            grade = result.grade,
            "Card graded"
        );
        result
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(&GradingConfig::default())
    }
}

/// Run a check, holding its score to [0, 1].
fn run_check(check: &dyn QualityCheck, card: &RectifiedImage) -> f64 {
    let score = check.score(card);
    if (0.0..=1.0).contains(&score) {
        return score;
    }
    warn!(check = check.name(), score, "Quality check score outside [0, 1]; clamping");
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}
