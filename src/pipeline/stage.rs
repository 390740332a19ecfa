use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

/// A step of the analysis pipeline, in execution order.
///
/// Implements Ord based on priority so timings sort in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Decode,
    Segmentation,
    Preprocessing,
    Acne,
    Pigmentation,
    Wrinkles,
    Hydration,
    Pores,
    UvDamage,
    Scoring,
    Overlays,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Decode => "decode",
            PipelineStage::Segmentation => "segmentation",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Acne => "acne",
            PipelineStage::Pigmentation => "pigmentation",
            PipelineStage::Wrinkles => "wrinkles",
            PipelineStage::Hydration => "hydration",
            PipelineStage::Pores => "pores",
            PipelineStage::UvDamage => "uv_damage",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Overlays => "overlays",
        }
    }

    /// Execution order (lower runs first)
    pub fn priority(&self) -> u8 {
        match self {
            PipelineStage::Decode => 0,
            PipelineStage::Segmentation => 1,
            PipelineStage::Preprocessing => 2,
            PipelineStage::Acne => 3,
            PipelineStage::Pigmentation => 4,
            PipelineStage::Wrinkles => 5,
            PipelineStage::Hydration => 6,
            PipelineStage::Pores => 7,
            PipelineStage::UvDamage => 8,
            PipelineStage::Scoring => 9,
            PipelineStage::Overlays => 10,
        }
    }
}

impl PartialOrd for PipelineStage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineStage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Wall-clock duration per stage for one job
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    durations: IndexMap<PipelineStage, Duration>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and record how long it took under `stage`.
    pub fn time<T>(&mut self, stage: PipelineStage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(stage, started.elapsed());
        out
    }

    pub fn record(&mut self, stage: PipelineStage, duration: Duration) {
        debug!("Stage {} took {:?}", stage, duration);
        *self.durations.entry(stage).or_default() += duration;
    }

    pub fn get(&self, stage: PipelineStage) -> Duration {
        self.durations.get(&stage).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.durations.values().sum()
    }

    /// Milliseconds per stage, in execution order.
    pub fn to_millis(&self) -> IndexMap<PipelineStage, f64> {
        let mut stages: Vec<_> = self.durations.iter().collect();
        stages.sort_by_key(|(stage, _)| **stage);
        stages
            .into_iter()
            .map(|(stage, duration)| (*stage, duration.as_secs_f64() * 1000.0))
            .collect()
    }
}
