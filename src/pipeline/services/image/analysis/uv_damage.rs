//! UV damage from lightness variation, freckle patterns and uneven pigment.
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{
    UV_ADAPTIVE_BLOCK, UV_ADAPTIVE_OFFSET, UV_DEVIATION_SIGMAS, UV_FRECKLE_DENSITY_SCALE,
    UV_VARIATION_PERCENTILE, UV_VARIATION_SCALE, UV_WEIGHTS,
};
use super::core::{round_to, AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary::{self, Structuring};
use crate::pipeline::services::image::float_map::{mean, min_max, percentile, std_dev, FloatMap};

const VARIANCE_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvDamageLevel {
    Severe,
    Poor,
    Moderate,
    Good,
    Excellent,
}

impl UvDamageLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            UvDamageLevel::Severe
        } else if score < 40.0 {
            UvDamageLevel::Poor
        } else if score < 60.0 {
            UvDamageLevel::Moderate
        } else if score < 80.0 {
            UvDamageLevel::Good
        } else {
            UvDamageLevel::Excellent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvDamageMetrics {
    pub score: f64,
    pub level: UvDamageLevel,
    /// Weighted damage magnitude in `[0, 1]`.
    pub damage: f64,
    pub variation_score: f64,
    /// Fraction of skin pixels with high lightness variance.
    pub high_variation_ratio: f64,
    pub freckle_count: usize,
    pub freckle_density: f64,
    pub uneven_pigmentation_ratio: f64,
    pub heatmap_mean: f64,
}

#[derive(Debug, Clone)]
pub struct UvDamageFindings {
    pub metrics: UvDamageMetrics,
    pub freckle_mask: GrayImage,
    /// Per-pixel damage in `[0, 1]`, zero off skin.
    pub heatmap: FloatMap,
}

struct Variation {
    score: f64,
    high_ratio: f64,
    variance: FloatMap,
}

struct Unevenness {
    ratio: f64,
    deviation: FloatMap,
}

#[derive(Debug, Clone, Default)]
pub struct UvDamageDetector;

impl UvDamageDetector {
    pub fn new() -> Self {
        Self
    }

    /// Mean 5x5 variance of skin lightness over the most variable pixels.
    fn color_variation(context: &AnalysisContext) -> Variation {
        let skin = context.skin.mask();
        let lightness = context.lab.lightness_8bit();
        let skin_values = lightness.values_where(skin);
        let (lo, hi) = min_max(&skin_values);
        let normalized = if skin_values.is_empty() {
            FloatMap::new(lightness.width(), lightness.height())
        } else {
            lightness
                .map(|v| ((v - lo) / (hi - lo + 1e-8)).clamp(0.0, 1.0))
                .masked(skin)
        };

        let variance = normalized.local_variance(VARIANCE_WINDOW);
        let values = variance.values_where(skin);
        let threshold = percentile(&values, UV_VARIATION_PERCENTILE);
        let high: Vec<f32> = values.iter().copied().filter(|&v| v > threshold).collect();
        Variation {
            score: mean(&high) as f64,
            high_ratio: high.len() as f64 / values.len().max(1) as f64,
            variance,
        }
    }

    /// Dark spots from an inverted Gaussian adaptive threshold.
    fn freckles(context: &AnalysisContext) -> (GrayImage, usize, f64) {
        let sigma = 0.3 * ((UV_ADAPTIVE_BLOCK as f32 - 1.0) * 0.5 - 1.0) + 0.8;
        let gray = context.gray.map(f32::round);
        let local = gray.gaussian_blur(sigma);
        let (width, height) = context.dimensions();
        let raw = binary::from_predicate(width, height, |x, y| {
            context.skin.contains(x, y) && gray.get(x, y) <= local.get(x, y) - UV_ADAPTIVE_OFFSET
        });
        let mask = binary::open_close(&raw, Structuring::Cross);
        let count = binary::label_components(&mask).len();
        let density = count as f64 / (context.skin_pixels() as f64 + 1e-8);
        (mask, count, density)
    }

    /// Fraction of skin pixels whose a* or b* deviates more than two sigmas from the skin mean.
    fn uneven_pigmentation(context: &AnalysisContext) -> Unevenness {
        let skin = context.skin.mask();
        let a = context.lab.a.values_where(skin);
        let b = context.lab.b.values_where(skin);
        if a.is_empty() {
            let (width, height) = context.dimensions();
            return Unevenness {
                ratio: 0.0,
                deviation: FloatMap::new(width, height),
            };
        }
        let (a_mean, a_std) = (mean(&a), std_dev(&a));
        let (b_mean, b_std) = (mean(&b), std_dev(&b));
        let deviating = a
            .iter()
            .zip(&b)
            .filter(|(&av, &bv)| {
                (av - a_mean).abs() > UV_DEVIATION_SIGMAS * a_std
                    || (bv - b_mean).abs() > UV_DEVIATION_SIGMAS * b_std
            })
            .count();
        let deviation = context.lab.a.zip_map(&context.lab.b, |av, bv| {
            ((av - a_mean).abs() + (bv - b_mean).abs()) / 2.0
        });
        Unevenness {
            ratio: deviating as f64 / a.len() as f64,
            deviation,
        }
    }

    /// Weighted lightness variance, freckles and normalized color deviation, clipped to `[0, 1]`.
    fn heatmap(
        context: &AnalysisContext,
        variation: &Variation,
        freckles: &GrayImage,
        unevenness: &Unevenness,
    ) -> FloatMap {
        let [w_color, w_freckle, w_uneven] = UV_WEIGHTS;
        let (lo, hi) = min_max(&unevenness.deviation.values_where(context.skin.mask()));
        let (width, height) = context.dimensions();
        FloatMap::from_fn(width, height, |x, y| {
            if !context.skin.contains(x, y) {
                return 0.0;
            }
            let mut value = w_color * variation.variance.get(x, y);
            if freckles.get_pixel(x, y)[0] > 0 {
                value += w_freckle;
            }
            let deviation = (unevenness.deviation.get(x, y) - lo) / (hi - lo + 1e-8);
            value += w_uneven * deviation;
            value.clamp(0.0, 1.0)
        })
    }
}

impl ModalityAnalyzer for UvDamageDetector {
    type Output = UvDamageFindings;

    fn name(&self) -> &'static str {
        "uv_damage"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<UvDamageFindings, PipelineError> {
        let variation = Self::color_variation(context);
        let (freckle_mask, freckle_count, freckle_density) = Self::freckles(context);
        let unevenness = Self::uneven_pigmentation(context);
        let variation_score = variation.score;
        let uneven_pigmentation_ratio = unevenness.ratio;

        let [w_color, w_freckle, w_uneven] = UV_WEIGHTS.map(f64::from);
        let damage = w_color * (variation_score / UV_VARIATION_SCALE as f64).min(1.0)
            + w_freckle * (freckle_density / UV_FRECKLE_DENSITY_SCALE as f64).min(1.0)
            + w_uneven * uneven_pigmentation_ratio;
        let score = round_to((100.0 - damage * 100.0).max(0.0), 2);
        debug!(
            "UV damage {:.3}: variation {:.4}, {} freckles, uneven {:.3}",
            damage, variation_score, freckle_count, uneven_pigmentation_ratio
        );
        let heatmap = Self::heatmap(context, &variation, &freckle_mask, &unevenness);
        let heatmap_mean = mean(&heatmap.values_where(context.skin.mask())) as f64;

        Ok(UvDamageFindings {
            metrics: UvDamageMetrics {
                score,
                level: UvDamageLevel::from_score(score),
                damage,
                variation_score,
                high_variation_ratio: variation.high_ratio,
                freckle_count,
                freckle_density,
                uneven_pigmentation_ratio,
                heatmap_mean,
            },
            freckle_mask,
            heatmap,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::*;

    #[test]
    fn test_levels() {
        assert_eq!(UvDamageLevel::from_score(0.0), UvDamageLevel::Severe);
        assert_eq!(UvDamageLevel::from_score(20.0), UvDamageLevel::Poor);
        assert_eq!(UvDamageLevel::from_score(79.99), UvDamageLevel::Good);
        assert_eq!(UvDamageLevel::from_score(100.0), UvDamageLevel::Excellent);
    }

    #[test]
    fn test_uniform_skin_is_undamaged() {
        let context = context_for(uniform_image(320, 320, [200, 160, 140]));
        let metrics = UvDamageDetector::new().analyze(&context).unwrap().metrics;
        assert_eq!(metrics.freckle_count, 0);
        assert_eq!(metrics.uneven_pigmentation_ratio, 0.0);
        assert_eq!(metrics.variation_score, 0.0);
        assert_eq!(metrics.score, 100.0);
        assert_eq!(metrics.level, UvDamageLevel::Excellent);
        assert_eq!(metrics.heatmap_mean, 0.0);
    }

    #[test]
    fn test_freckled_skin_scores_lower() {
        let image = RgbImage::from_fn(320, 320, |x, y| {
            if x % 12 < 3 && y % 12 < 3 {
                Rgb([130, 90, 70])
            } else {
                Rgb([200, 160, 140])
            }
        });
        let context = context_for(image);
        let findings = UvDamageDetector::new().analyze(&context).unwrap();
        let metrics = &findings.metrics;

        assert!(metrics.freckle_count > 0);
        assert!(metrics.variation_score > 0.0);
        assert!(metrics.score < 100.0);
        assert!(metrics.damage > 0.0 && metrics.damage <= 1.0);

        let heatmap = &findings.heatmap;
        assert!(heatmap.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(heatmap.get(0, 0), 0.0);
        assert!(metrics.heatmap_mean > 0.0);
        // Freckles are hotter than the clear skin between them.
        let (freckle, clear) = (heatmap.get(157, 157), heatmap.get(163, 157));
        assert!(findings.freckle_mask.get_pixel(157, 157)[0] > 0);
        assert!(freckle > clear);
    }
}
