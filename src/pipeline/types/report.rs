use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::region::Region;
use crate::pipeline::services::image::analysis::{HydrationMetrics, PoreMetrics, UvDamageMetrics};
use crate::pipeline::stage::PipelineStage;

/// Bounded `[0, 100]` scores, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub acne: f64,
    pub pigmentation: f64,
    pub wrinkles: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    pub acne_count: u32,
    /// Whole-face pigmentation percentage.
    pub pig_area_pct: f64,
    pub wrinkle_density: f64,
}

/// Paths of the rendered overlay images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlays {
    pub acne: String,
    pub pigmentation: String,
    pub wrinkles: String,
}

/// Modalities reported alongside the scored ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityReport {
    pub hydration: HydrationMetrics,
    pub pores: PoreMetrics,
    pub uv_damage: UvDamageMetrics,
}

/// Everything a completed job publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub scores: Scores,
    pub regions: IndexMap<Region, RegionMetrics>,
    pub overlays: Overlays,
    pub modalities: ModalityReport,
    /// Milliseconds per stage.
    pub timings: IndexMap<PipelineStage, f64>,
}
