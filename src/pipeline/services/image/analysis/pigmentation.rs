//! Pigmentation as perceptual color deviation from a baseline skin tone.
use image::GrayImage;
use tracing::debug;

use super::config::{AnalysisConfig, SHADING_EDGE_THRESHOLD};
use super::core::{AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary::{self, Structuring};
use crate::pipeline::services::image::float_map::{median, Kernel};

#[derive(Debug, Clone)]
pub struct PigmentationFindings {
    pub mask: GrayImage,
    /// Pigmented pixels as a percentage of skin pixels.
    pub area_pct: f64,
    /// L*a*b* reference the distances were measured from.
    pub baseline: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct PigmentationAnalyzer {
    tau: f32,
    baseline: Option<[f32; 3]>,
}

impl PigmentationAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            tau: config.pigmentation_tau,
            baseline: None,
        }
    }

    /// Measure against a fixed L*a*b* reference instead of the skin median.
    pub fn with_baseline(mut self, baseline: [f32; 3]) -> Self {
        self.baseline = Some(baseline);
        self
    }

    fn median_baseline(context: &AnalysisContext) -> [f32; 3] {
        let skin = context.skin.mask();
        [
            median(&context.lab.l.values_where(skin)),
            median(&context.lab.a.values_where(skin)),
            median(&context.lab.b.values_where(skin)),
        ]
    }

    /// Strong second-derivative edges, treated as lighting rather than pigment.
    fn shading_edges(context: &AnalysisContext) -> GrayImage {
        let response = context
            .gray
            .correlate(&Kernel::laplacian_wide())
            .map(f32::abs)
            .normalized();
        let (width, height) = context.dimensions();
        binary::from_predicate(width, height, |x, y| {
            response.get(x, y) > SHADING_EDGE_THRESHOLD
        })
    }
}

impl ModalityAnalyzer for PigmentationAnalyzer {
    type Output = PigmentationFindings;

    fn name(&self) -> &'static str {
        "pigmentation"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<PigmentationFindings, PipelineError> {
        let baseline = self
            .baseline
            .unwrap_or_else(|| Self::median_baseline(context));
        let edges = Self::shading_edges(context);
        let (width, height) = context.dimensions();

        let raw = binary::from_predicate(width, height, |x, y| {
            context.skin.contains(x, y)
                && edges.get_pixel(x, y)[0] == 0
                && context.lab.distance_to(x, y, baseline) > self.tau
        });
        let cleaned = binary::open_close(&raw, Structuring::Square);
        let mask = binary::intersect(&cleaned, context.skin.mask());

        let pigmented = binary::count_set(&mask);
        let area_pct = pigmented as f64 / (context.skin_pixels() as f64 + 1e-6) * 100.0;
        debug!(
            "Pigmentation baseline {:?}, {} pixels ({:.2}%)",
            baseline, pigmented, area_pct
        );

        Ok(PigmentationFindings {
            mask,
            area_pct,
            baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::*;

    #[test]
    fn test_image_matching_baseline_has_no_pigmentation() {
        let context = context_for(uniform_image(320, 320, [200, 160, 140]));
        let findings = PigmentationAnalyzer::new(&AnalysisConfig::default())
            .analyze(&context)
            .unwrap();
        assert_eq!(findings.area_pct, 0.0);
        assert_eq!(binary::count_set(&findings.mask), 0);
    }

    #[test]
    fn test_dark_patch_is_flagged() {
        let image = RgbImage::from_fn(320, 320, |x, y| {
            if (40..70).contains(&x) && (130..160).contains(&y) {
                Rgb([120, 80, 60])
            } else {
                Rgb([200, 160, 140])
            }
        });
        let context = context_for(image);
        let findings = PigmentationAnalyzer::new(&AnalysisConfig::default())
            .analyze(&context)
            .unwrap();

        assert!(findings.area_pct > 0.0);
        assert!(findings.area_pct < 5.0);
        assert!(findings.mask.get_pixel(55, 145)[0] > 0);
        assert_eq!(findings.mask.get_pixel(150, 290)[0], 0);
    }

    #[test]
    fn test_explicit_baseline_is_used() {
        let context = context_for(uniform_image(320, 320, [200, 160, 140]));
        let findings = PigmentationAnalyzer::new(&AnalysisConfig::default())
            .with_baseline([20.0, 0.0, 0.0])
            .analyze(&context)
            .unwrap();
        assert_eq!(findings.baseline, [20.0, 0.0, 0.0]);
        assert!(findings.area_pct > 99.0);
    }
}
