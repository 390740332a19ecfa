//! Pore detection, characterization and health scoring.
use std::collections::HashSet;

use image::GrayImage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{
    PORE_CLOGGING_PENALTY, PORE_CLOGGING_PERCENTILE, PORE_DARKNESS_SCALE, PORE_HEATMAP_SIZE_SCALE,
    PORE_HEATMAP_WEIGHTS, PORE_MEDIUM_AREA, PORE_RESPONSE_PERCENTILE, PORE_SIZE_PENALTY,
    PORE_SIZE_PENALTY_SCALE, PORE_SIZE_SCALE, PORE_SMALL_AREA,
};
use super::core::{round_to, AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary::{self, Component, Structuring};
use crate::pipeline::services::image::float_map::{
    mean, min_max, percentile, std_dev, FloatMap, Kernel,
};
use crate::pipeline::types::detection::BoundingBox;

const DOG_FINE_SIGMA: f32 = 0.5;
const DOG_COARSE_SIGMA: f32 = 1.5;
const DARKNESS_WINDOW: usize = 5;
const CLOGGING_WINDOW: usize = 7;
/// Responses below this are blur rounding on flat skin.
const RESPONSE_FLOOR: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoreHealthLevel {
    Clogged,
    Poor,
    Moderate,
    Good,
    Excellent,
}

impl PoreHealthLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            PoreHealthLevel::Clogged
        } else if score < 40.0 {
            PoreHealthLevel::Poor
        } else if score < 60.0 {
            PoreHealthLevel::Moderate
        } else if score < 80.0 {
            PoreHealthLevel::Good
        } else {
            PoreHealthLevel::Excellent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoreSizeClass {
    Small,
    Medium,
    Large,
    Unknown,
}

impl PoreSizeClass {
    pub fn from_mean_area(mean_area: Option<f64>) -> Self {
        match mean_area {
            None => PoreSizeClass::Unknown,
            Some(a) if a < PORE_SMALL_AREA as f64 => PoreSizeClass::Small,
            Some(a) if a < PORE_MEDIUM_AREA as f64 => PoreSizeClass::Medium,
            Some(_) => PoreSizeClass::Large,
        }
    }
}

/// Geometry of one detected pore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoreProperties {
    pub area: u32,
    pub perimeter: u32,
    pub circularity: f32,
    pub centroid: (u32, u32),
    pub bbox: BoundingBox,
    pub aspect_ratio: f32,
}

impl From<&Component> for PoreProperties {
    fn from(component: &Component) -> Self {
        Self {
            area: component.area,
            perimeter: component.perimeter,
            circularity: component.circularity(),
            centroid: component.rounded_centroid(),
            bbox: component.bbox,
            aspect_ratio: component.aspect_ratio(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
}

impl ChannelStats {
    fn of(values: &[f32]) -> Self {
        Self {
            mean: mean(values) as f64,
            std: std_dev(values) as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DarknessStats {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandDensity {
    pub top: f64,
    pub middle: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBreakdown {
    pub overall: f64,
    pub darkness_score: f64,
    pub size_score: f64,
    pub uniformity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoreMetrics {
    pub score: f64,
    pub level: PoreHealthLevel,
    pub pore_count: usize,
    pub mean_area: f64,
    pub std_area: f64,
    pub size_distribution: PoreSizeClass,
    pub darkness: DarknessStats,
    /// Per-channel statistics over pore pixels: HSV on the 8-bit scale, then L*a*b*.
    pub colors: IndexMap<String, ChannelStats>,
    pub regional_density: BandDensity,
    pub uniformity: f64,
    pub health: HealthBreakdown,
    pub clogged_ratio: f64,
    pub mean_clogging: f64,
    pub heatmap_mean: f64,
}

#[derive(Debug, Clone)]
pub struct PoreFindings {
    pub metrics: PoreMetrics,
    pub pores: Vec<PoreProperties>,
    pub mask: GrayImage,
    /// Per-pixel pore health in `[0, 1]`, zero off skin.
    pub heatmap: FloatMap,
}

struct Clogging {
    ratio: f64,
    mean: f64,
    mask: GrayImage,
}

#[derive(Debug, Clone, Default)]
pub struct PoreAnalyzer;

impl PoreAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Mean of Laplacian magnitude, DoG magnitude and normalized Hessian determinant.
    pub fn blob_response(gray: &FloatMap) -> FloatMap {
        let laplacian = gray.correlate(&Kernel::laplacian()).map(f32::abs);
        let dog = gray
            .gaussian_blur(DOG_FINE_SIGMA)
            .zip_map(&gray.gaussian_blur(DOG_COARSE_SIGMA), |a, b| (a - b).abs());

        let xx = gray.correlate(&Kernel::sobel_xx());
        let yy = gray.correlate(&Kernel::sobel_yy());
        let xy = gray.correlate(&Kernel::sobel_xy());
        let determinant = xx
            .zip_map(&yy, |a, b| a * b)
            .zip_map(&xy, |d, c| (d - c * c).abs());
        let (_, peak) = determinant.min_max();
        let hessian = if peak > 0.0 {
            determinant.map(|v| v / peak)
        } else {
            determinant
        };

        laplacian
            .zip_map(&dog, |a, b| a + b)
            .zip_map(&hessian, |s, h| (s + h) / 3.0)
            .map(|v| if v < RESPONSE_FLOOR { 0.0 } else { v })
    }

    fn candidates(context: &AnalysisContext) -> GrayImage {
        let skin = context.skin.mask();
        let response = Self::blob_response(&context.gray);
        let threshold = percentile(&response.values_where(skin), PORE_RESPONSE_PERCENTILE);
        let (width, height) = context.dimensions();
        let raw = binary::from_predicate(width, height, |x, y| {
            context.skin.contains(x, y) && response.get(x, y) > threshold
        });
        binary::open_close(&raw, Structuring::Cross)
    }

    fn darkness(context: &AnalysisContext, mask: &GrayImage) -> DarknessStats {
        let darkness = context
            .gray
            .box_mean(DARKNESS_WINDOW)
            .zip_map(&context.gray, |local, v| (local - v).max(0.0));
        let values = darkness.values_where(mask);
        DarknessStats {
            mean: mean(&values) as f64,
            std: std_dev(&values) as f64,
            max: min_max(&values).1 as f64,
        }
    }

    fn colors(context: &AnalysisContext, mask: &GrayImage) -> IndexMap<String, ChannelStats> {
        let [h, s, v] = context.hsv.to_8bit_scale();
        let channels = [
            ("hue", &h),
            ("saturation", &s),
            ("value", &v),
            ("lightness", &context.lab.l),
            ("a_channel", &context.lab.a),
            ("b_channel", &context.lab.b),
        ];
        channels
            .into_iter()
            .map(|(name, channel)| {
                (name.to_string(), ChannelStats::of(&channel.values_where(mask)))
            })
            .collect()
    }

    /// Distinct pores per skin pixel in the top, middle and bottom thirds.
    fn distribution(context: &AnalysisContext, labels: &binary::LabelImage) -> (BandDensity, f64) {
        let height = context.dimensions().1;
        let bands = [
            (0, height / 3),
            (height / 3, 2 * height / 3),
            (2 * height / 3, height),
        ];
        let densities: Vec<f32> = bands
            .iter()
            .map(|&(start, end)| {
                let mut seen = HashSet::new();
                let mut skin_area = 0u64;
                for y in start..end {
                    for x in 0..labels.width() {
                        if !context.skin.contains(x, y) {
                            continue;
                        }
                        skin_area += 1;
                        let label = labels.get_pixel(x, y)[0];
                        if label > 0 {
                            seen.insert(label);
                        }
                    }
                }
                if skin_area > 0 {
                    seen.len() as f32 / skin_area as f32
                } else {
                    0.0
                }
            })
            .collect();

        let uniformity = 1.0 - std_dev(&densities) as f64 / (mean(&densities) as f64 + 1e-8);
        let density = BandDensity {
            top: densities[0] as f64,
            middle: densities[1] as f64,
            bottom: densities[2] as f64,
        };
        (density, uniformity)
    }

    /// Pore pixels whose local texture plus color spread is above the upper quartile.
    fn clogging(context: &AnalysisContext, mask: &GrayImage) -> Clogging {
        let local_std = context.gray.local_std(CLOGGING_WINDOW);
        let [h, s, v] = context.hsv.to_8bit_scale();
        let (width, height) = context.dimensions();
        let score = FloatMap::from_fn(width, height, |x, y| {
            let color_spread = std_dev(&[h.get(x, y), s.get(x, y), v.get(x, y)]);
            (local_std.get(x, y) + color_spread) / 2.0
        });

        let values = score.values_where(mask);
        if values.is_empty() {
            return Clogging {
                ratio: 0.0,
                mean: 0.0,
                mask: GrayImage::new(width, height),
            };
        }
        let threshold = percentile(&values, PORE_CLOGGING_PERCENTILE);
        let clogged = binary::from_predicate(width, height, |x, y| {
            mask.get_pixel(x, y)[0] > 0 && score.get(x, y) > threshold
        });
        Clogging {
            ratio: binary::count_set(&clogged) as f64 / values.len() as f64,
            mean: mean(&values) as f64,
            mask: clogged,
        }
    }

    /// Health breakdown and the final score, floored at zero.
    pub fn health(
        darkness_mean: f64,
        mean_area: f64,
        uniformity: f64,
        clogged_ratio: f64,
    ) -> (HealthBreakdown, f64) {
        let darkness_score = 1.0 - (darkness_mean / PORE_DARKNESS_SCALE as f64).min(1.0);
        let size_score = 1.0 - (mean_area / PORE_SIZE_SCALE as f64).min(1.0);
        let overall = (darkness_score + size_score + uniformity) / 3.0;

        let size_penalty = (mean_area / PORE_SIZE_PENALTY_SCALE as f64).min(1.0);
        let raw = overall
            * (1.0 - clogged_ratio * PORE_CLOGGING_PENALTY as f64)
            * (1.0 - size_penalty * PORE_SIZE_PENALTY as f64);
        let breakdown = HealthBreakdown {
            overall,
            darkness_score,
            size_score,
            uniformity_score: uniformity,
        };
        (breakdown, round_to((raw * 100.0).max(0.0), 2))
    }

    /// Pore pixels weighted by overall health, unclogged skin, and a size bonus at each centroid.
    fn heatmap(
        context: &AnalysisContext,
        pore_mask: &GrayImage,
        clogged: &GrayImage,
        pores: &[PoreProperties],
        overall: f64,
    ) -> FloatMap {
        let [w_health, w_clear, w_size] = PORE_HEATMAP_WEIGHTS;
        let (width, height) = context.dimensions();
        let mut heatmap = FloatMap::from_fn(width, height, |x, y| {
            if !context.skin.contains(x, y) {
                return 0.0;
            }
            let mut value = 0.0;
            if pore_mask.get_pixel(x, y)[0] > 0 {
                value += overall as f32 * w_health;
            }
            if clogged.get_pixel(x, y)[0] == 0 {
                value += w_clear;
            }
            value
        });
        for pore in pores {
            let (x, y) = pore.centroid;
            if x < width && y < height {
                let size_score = 1.0 - (pore.area as f32 / PORE_HEATMAP_SIZE_SCALE).min(1.0);
                heatmap.set(x, y, heatmap.get(x, y) + size_score * w_size);
            }
        }
        heatmap.map(|v| v.clamp(0.0, 1.0))
    }
}

impl ModalityAnalyzer for PoreAnalyzer {
    type Output = PoreFindings;

    fn name(&self) -> &'static str {
        "pores"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<PoreFindings, PipelineError> {
        let mask = Self::candidates(context);
        let found = binary::label_components(&mask);
        let pores: Vec<PoreProperties> =
            found.components.iter().map(PoreProperties::from).collect();

        let areas: Vec<f32> = pores.iter().map(|p| p.area as f32).collect();
        let mean_area = (!areas.is_empty()).then(|| mean(&areas) as f64);
        let darkness = Self::darkness(context, &mask);
        let (regional_density, uniformity) = Self::distribution(context, &found.labels);
        let clogging = Self::clogging(context, &mask);
        let (health, score) = Self::health(
            darkness.mean,
            mean_area.unwrap_or(0.0),
            uniformity,
            clogging.ratio,
        );
        let heatmap = Self::heatmap(context, &mask, &clogging.mask, &pores, health.overall);
        let heatmap_mean = mean(&heatmap.values_where(context.skin.mask())) as f64;
        debug!("Pore score {:.2} from {} pores", score, pores.len());

        let metrics = PoreMetrics {
            score,
            level: PoreHealthLevel::from_score(score),
            pore_count: pores.len(),
            mean_area: mean_area.unwrap_or(0.0),
            std_area: std_dev(&areas) as f64,
            size_distribution: PoreSizeClass::from_mean_area(mean_area),
            darkness,
            colors: Self::colors(context, &mask),
            regional_density,
            uniformity,
            health,
            clogged_ratio: clogging.ratio,
            mean_clogging: clogging.mean,
            heatmap_mean,
        };

        Ok(PoreFindings {
            metrics,
            pores,
            mask,
            heatmap,
        })
    }
}
