use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::services::image::analysis::core::round_to;
use crate::pipeline::services::image::analysis::{
    AcneDetector, AnalysisConfig, AnalysisContext, HydrationAnalyzer, ModalityAnalyzer,
    PigmentationAnalyzer, PoreAnalyzer, UvDamageDetector, WrinkleAnalyzer,
};
use crate::pipeline::services::{
    OverlayRenderer, Preprocessor, RegionSegmenter, ScoreAggregator, ScoreInputs,
};
use crate::pipeline::stage::{PipelineStage, StageTimings};
use crate::pipeline::types::landmarks::LandmarkSet;
use crate::pipeline::types::report::{AnalysisReport, ModalityReport, RegionMetrics};

/// Runs every analysis stage for one image, strictly in order.
///
/// Holds no per-job state, so one instance is shared by all jobs.
#[derive(Debug)]
pub struct AnalysisPipeline {
    segmenter: RegionSegmenter,
    preprocessor: Preprocessor,
    acne: AcneDetector,
    pigmentation: PigmentationAnalyzer,
    wrinkles: WrinkleAnalyzer,
    hydration: HydrationAnalyzer,
    pores: PoreAnalyzer,
    uv_damage: UvDamageDetector,
    aggregator: ScoreAggregator,
    renderer: OverlayRenderer,
}

impl AnalysisPipeline {
    pub fn new(config: &AnalysisConfig, acne_model: Option<&Path>) -> Self {
        Self::with_acne_detector(config, AcneDetector::from_model_path(acne_model, config))
    }

    pub fn with_acne_detector(config: &AnalysisConfig, acne: AcneDetector) -> Self {
        Self {
            segmenter: RegionSegmenter::new(),
            preprocessor: Preprocessor::new(),
            acne,
            pigmentation: PigmentationAnalyzer::new(config),
            wrinkles: WrinkleAnalyzer::new(config),
            hydration: HydrationAnalyzer::new(),
            pores: PoreAnalyzer::new(),
            uv_damage: UvDamageDetector::new(),
            aggregator: ScoreAggregator::new(),
            renderer: OverlayRenderer::new(),
        }
    }

    pub fn acne_backend(&self) -> &'static str {
        self.acne.backend_name()
    }

    /// Decode, analyze and render one image. Overlays are written to `job_dir`.
    pub fn run(
        &self,
        image_bytes: &[u8],
        landmarks: &LandmarkSet,
        job_dir: &Path,
    ) -> Result<AnalysisReport, PipelineError> {
        let mut timings = StageTimings::new();

        let original = timings.time(PipelineStage::Decode, || {
            image::load_from_memory(image_bytes).map(|decoded| decoded.to_rgb8())
        })?;
        let (width, height) = original.dimensions();

        let segmentation = timings.time(PipelineStage::Segmentation, || {
            self.segmenter.segment(landmarks, width, height)
        })?;
        let preprocessed = timings.time(PipelineStage::Preprocessing, || {
            self.preprocessor.run(&original)
        });

        let context = AnalysisContext::new(
            preprocessed.image,
            segmentation.regions,
            segmentation.skin,
        );

        let acne = run_modality(&mut timings, PipelineStage::Acne, &self.acne, &context)?;
        let pigmentation = run_modality(
            &mut timings,
            PipelineStage::Pigmentation,
            &self.pigmentation,
            &context,
        )?;
        let wrinkles =
            run_modality(&mut timings, PipelineStage::Wrinkles, &self.wrinkles, &context)?;
        let hydration =
            run_modality(&mut timings, PipelineStage::Hydration, &self.hydration, &context)?;
        let pores = run_modality(&mut timings, PipelineStage::Pores, &self.pores, &context)?;
        let uv_damage =
            run_modality(&mut timings, PipelineStage::UvDamage, &self.uv_damage, &context)?;

        let region_counts = acne.region_counts(&context.regions);
        let scores = timings.time(PipelineStage::Scoring, || {
            self.aggregator.aggregate(&ScoreInputs {
                acne_count: region_counts.values().sum(),
                lesion_area_norm: acne.lesion_area_norm(context.skin_pixels()),
                pig_area_pct: pigmentation.area_pct,
                mean_wrinkle_density: wrinkles.mean_density(),
            })
        });

        let overlays = timings.time(PipelineStage::Overlays, || {
            std::fs::create_dir_all(job_dir).map_err(|e| PipelineError::Overlay {
                path: job_dir.display().to_string(),
                message: e.to_string(),
            })?;
            self.renderer.render(
                &original,
                &acne.detections,
                &pigmentation.mask,
                &wrinkles.mask,
                job_dir,
            )
        })?;

        let regions: IndexMap<_, _> = context
            .regions
            .iter()
            .map(|mask| {
                let region = mask.region;
                let metrics = RegionMetrics {
                    acne_count: region_counts.get(&region).copied().unwrap_or(0),
                    pig_area_pct: round_to(pigmentation.area_pct, 2),
                    wrinkle_density: wrinkles
                        .regions
                        .get(&region)
                        .map(|w| round_to(w.density, 4))
                        .unwrap_or(0.0),
                };
                (region, metrics)
            })
            .collect();

        debug!(
            "Analysis finished in {:?}: overall {}",
            timings.total(),
            scores.overall
        );
        Ok(AnalysisReport {
            scores,
            regions,
            overlays,
            modalities: ModalityReport {
                hydration: hydration.metrics,
                pores: pores.metrics,
                uv_damage: uv_damage.metrics,
            },
            timings: timings.to_millis(),
        })
    }
}

fn run_modality<A: ModalityAnalyzer>(
    timings: &mut StageTimings,
    stage: PipelineStage,
    analyzer: &A,
    context: &AnalysisContext,
) -> Result<A::Output, PipelineError> {
    debug!("Running {} analyzer", analyzer.name());
    timings.time(stage, || analyzer.analyze(context))
}
