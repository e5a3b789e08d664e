pub mod batch;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use batch::{grade_batch, BatchEntry, BatchOptions, BatchStatus};
pub use config::GradingConfig;
pub use error::{ConfigError, GradeError};
pub use models::{
    BorderMeasurement, CenteringReport, GradeOutcome, GradeResult, OrderedQuad, Point2, QuadCorners,
    RectifiedImage, SubScores,
};
pub use pipeline::{DebugConfig, DebugDump, DebugObserver, Grader};
