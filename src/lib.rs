pub mod config;
pub mod coordinator;
pub mod error;
pub mod jobs;
pub mod pipeline;

pub use config::Configuration;
pub use coordinator::{JobOrchestrator, OrchestratorBuilder};
pub use error::{AppError, PipelineError};
pub use jobs::{JobStatusResponse, SubmitResponse};
pub use pipeline::services::image::analysis::{
    AcneDetector, AnalysisConfig, HydrationAnalyzer, PigmentationAnalyzer, PoreAnalyzer,
    UvDamageDetector, WrinkleAnalyzer,
};
pub use pipeline::types::{
    AnalysisReport, Detection, Landmark, LandmarkSet, Region, RegionMask, SkinMask,
};
pub use pipeline::AnalysisPipeline;
