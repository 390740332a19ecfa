#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod services;
pub mod stage;
pub mod types;

pub use pipeline::AnalysisPipeline;
pub use stage::{PipelineStage, StageTimings};
pub use types::{AnalysisReport, LandmarkSet, Region};
