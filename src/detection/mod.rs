//! Image-processing stages of the grading pipeline, in pipeline order.

pub mod preprocessing;
pub mod contours;
pub mod perspective;
pub mod centering;
pub mod quality;
pub mod grading;

pub use centering::CenteringMeasurer;
pub use contours::ContourLocator;
pub use grading::GradeAggregator;
pub use perspective::PerspectiveRectifier;
pub use preprocessing::{Preprocessed, Preprocessor};
pub use quality::{CornerCheck, EdgeCheck, QualityCheck, SurfaceCheck};
