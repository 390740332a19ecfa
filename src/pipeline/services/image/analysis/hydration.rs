//! Hydration estimate from texture, roughness, pore visibility and smoothness.
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{
    GABOR_ASPECT, HYDRATION_FREQUENCIES, HYDRATION_HEATMAP_TEXTURE_SCALE, HYDRATION_KERNEL_SIGMA,
    HYDRATION_KERNEL_SIZE, HYDRATION_ORIENTATIONS_DEG, HYDRATION_PORE_DENSITY_SCALE,
    HYDRATION_PORE_PERCENTILE, HYDRATION_ROUGHNESS_SCALE, HYDRATION_SIGNAL_WEIGHT,
    HYDRATION_SMOOTHNESS_WINDOWS, HYDRATION_TEXTURE_SCALE,
};
use super::core::{round_to, AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary;
use crate::pipeline::services::image::float_map::{
    mean, min_max, percentile, std_dev, FloatMap, Kernel,
};

/// Sigma of the 5x5 pre-blur used for pore visibility.
const PORE_BLUR_SIGMA: f32 = 1.1;
const ROUGHNESS_WINDOW: usize = 7;
const TEXTURE_HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationLevel {
    Dehydrated,
    Dry,
    Normal,
    WellHydrated,
    Excellent,
}

impl HydrationLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            HydrationLevel::Dehydrated
        } else if score < 50.0 {
            HydrationLevel::Dry
        } else if score < 70.0 {
            HydrationLevel::Normal
        } else if score < 85.0 {
            HydrationLevel::WellHydrated
        } else {
            HydrationLevel::Excellent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureSignal {
    pub mean: f64,
    pub std: f64,
    pub entropy: f64,
    pub responses: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoughnessSignal {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub local_variation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoreVisibilitySignal {
    pub density: f64,
    pub intensity: f64,
    pub clusters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothnessSignal {
    pub overall: f64,
    /// `(window size, smoothness)` per window.
    pub by_window: Vec<(usize, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationMetrics {
    pub score: f64,
    pub level: HydrationLevel,
    pub texture: TextureSignal,
    pub roughness: RoughnessSignal,
    pub pore_visibility: PoreVisibilitySignal,
    pub smoothness: SmoothnessSignal,
    pub heatmap_mean: f64,
}

#[derive(Debug, Clone)]
pub struct HydrationFindings {
    pub metrics: HydrationMetrics,
    /// Per-pixel hydration in `[0, 1]`, zero outside skin.
    pub heatmap: FloatMap,
}

struct Maps {
    roughness: FloatMap,
    pore_mask: image::GrayImage,
    local_std: FloatMap,
}

#[derive(Debug, Clone)]
pub struct HydrationAnalyzer {
    texture_bank: Vec<Kernel>,
}

impl HydrationAnalyzer {
    pub fn new() -> Self {
        let mut texture_bank = Vec::new();
        for degrees in HYDRATION_ORIENTATIONS_DEG {
            for frequency in HYDRATION_FREQUENCIES {
                texture_bank.push(Kernel::gabor(
                    HYDRATION_KERNEL_SIZE,
                    HYDRATION_KERNEL_SIGMA,
                    degrees.to_radians(),
                    2.0 * std::f32::consts::PI * frequency,
                    GABOR_ASPECT,
                    0.0,
                ));
            }
        }
        Self { texture_bank }
    }

    /// Mean 8-bit filter response over skin for each kernel in the bank.
    fn texture(&self, context: &AnalysisContext) -> TextureSignal {
        let skin = context.skin.mask();
        let roi = context.filter_roi();
        let responses: Vec<f32> = self
            .texture_bank
            .iter()
            .map(|kernel| {
                let filtered = context
                    .gray
                    .correlate_within(kernel, roi)
                    .map(|v| v.round().clamp(0.0, 255.0));
                mean(&filtered.values_where(skin))
            })
            .collect();

        TextureSignal {
            mean: mean(&responses) as f64,
            std: std_dev(&responses) as f64,
            entropy: histogram_entropy(&responses, TEXTURE_HISTOGRAM_BINS),
            responses,
        }
    }

    fn roughness(context: &AnalysisContext) -> (RoughnessSignal, FloatMap) {
        let skin = context.skin.mask();
        let gx = context.gray.correlate(&Kernel::sobel_x());
        let gy = context.gray.correlate(&Kernel::sobel_y());
        let magnitude = gx.zip_map(&gy, |a, b| (a * a + b * b).sqrt());

        let values = magnitude.values_where(skin);
        let local = magnitude.box_mean(ROUGHNESS_WINDOW).values_where(skin);
        let signal = RoughnessSignal {
            mean: mean(&values) as f64,
            std: std_dev(&values) as f64,
            max: min_max(&values).1 as f64,
            local_variation: std_dev(&local) as f64,
        };
        (signal, magnitude)
    }

    fn pore_visibility(context: &AnalysisContext) -> (PoreVisibilitySignal, image::GrayImage) {
        let skin = context.skin.mask();
        let response = context
            .gray
            .gaussian_blur(PORE_BLUR_SIGMA)
            .correlate(&Kernel::laplacian())
            .map(f32::abs)
            .masked(skin);

        let threshold = percentile(&response.values_where(skin), HYDRATION_PORE_PERCENTILE);
        let (width, height) = context.dimensions();
        let pore_mask = binary::from_predicate(width, height, |x, y| {
            context.skin.contains(x, y) && response.get(x, y) > threshold
        });

        let pore_pixels = binary::count_set(&pore_mask);
        let signal = PoreVisibilitySignal {
            density: pore_pixels as f64 / context.skin_pixels().max(1) as f64,
            intensity: mean(&response.values_where(&pore_mask)) as f64,
            clusters: binary::label_components(&pore_mask).len(),
        };
        (signal, pore_mask)
    }

    fn smoothness(context: &AnalysisContext) -> (SmoothnessSignal, FloatMap) {
        let skin = context.skin.mask();
        let mut by_window = Vec::with_capacity(HYDRATION_SMOOTHNESS_WINDOWS.len());
        let mut last = FloatMap::new(context.gray.width(), context.gray.height());
        for window in HYDRATION_SMOOTHNESS_WINDOWS {
            let local_std = context.gray.local_std(window);
            let smoothness = 1.0 / (1.0 + mean(&local_std.values_where(skin)) as f64);
            by_window.push((window, smoothness));
            last = local_std;
        }
        let overall = by_window.iter().map(|(_, s)| s).sum::<f64>() / by_window.len() as f64;
        (SmoothnessSignal { overall, by_window }, last)
    }

    fn score(
        texture: &TextureSignal,
        roughness: &RoughnessSignal,
        pores: &PoreVisibilitySignal,
        smoothness: &SmoothnessSignal,
    ) -> f64 {
        let weight = HYDRATION_SIGNAL_WEIGHT as f64;
        let texture_score = 1.0 / (1.0 + texture.std / HYDRATION_TEXTURE_SCALE as f64);
        let roughness_score = 1.0 / (1.0 + roughness.mean / HYDRATION_ROUGHNESS_SCALE as f64);
        let pore_score = 1.0 - (pores.density / HYDRATION_PORE_DENSITY_SCALE as f64).min(1.0);
        let combined = weight * texture_score
            + weight * roughness_score
            + weight * pore_score
            + weight * smoothness.overall;
        round_to(combined * 100.0, 2)
    }

    fn heatmap(context: &AnalysisContext, texture: &TextureSignal, maps: &Maps) -> FloatMap {
        let weight = HYDRATION_SIGNAL_WEIGHT;
        let texture_term =
            weight / (1.0 + texture.std as f32 / HYDRATION_HEATMAP_TEXTURE_SCALE);
        let roughness = maps.roughness.normalized();
        let (_, std_max) = maps.local_std.min_max();
        let smoothness = (std_max > 0.0).then(|| maps.local_std.normalized());

        let (width, height) = context.dimensions();
        FloatMap::from_fn(width, height, |x, y| {
            if !context.skin.contains(x, y) {
                return 0.0;
            }
            let mut value = texture_term + weight * (1.0 - roughness.get(x, y));
            if maps.pore_mask.get_pixel(x, y)[0] == 0 {
                value += weight;
            }
            if let Some(smoothness) = &smoothness {
                value += weight * (1.0 - smoothness.get(x, y));
            }
            value.clamp(0.0, 1.0)
        })
    }
}

impl Default for HydrationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModalityAnalyzer for HydrationAnalyzer {
    type Output = HydrationFindings;

    fn name(&self) -> &'static str {
        "hydration"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<HydrationFindings, PipelineError> {
        let texture = self.texture(context);
        let (roughness, roughness_map) = Self::roughness(context);
        let (pore_visibility, pore_mask) = Self::pore_visibility(context);
        let (smoothness, local_std) = Self::smoothness(context);

        let score = Self::score(&texture, &roughness, &pore_visibility, &smoothness);
        let maps = Maps {
            roughness: roughness_map,
            pore_mask,
            local_std,
        };
        let heatmap = Self::heatmap(context, &texture, &maps);
        let heatmap_mean = mean(&heatmap.values_where(context.skin.mask())) as f64;
        debug!("Hydration score {:.2}", score);

        Ok(HydrationFindings {
            metrics: HydrationMetrics {
                score,
                level: HydrationLevel::from_score(score),
                texture,
                roughness,
                pore_visibility,
                smoothness,
                heatmap_mean,
            },
            heatmap,
        })
    }
}

/// Shannon entropy (nats) of a `bins`-bucket histogram of `values`.
pub fn histogram_entropy(values: &[f32], bins: usize) -> f64 {
    if values.is_empty() || bins == 0 {
        return 0.0;
    }
    let (mut lo, mut hi) = min_max(values);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let mut counts = vec![0f64; bins];
    for &v in values {
        let bin = (((v - lo) / (hi - lo)) * bins as f32) as usize;
        counts[bin.min(bins - 1)] += 1.0;
    }
    let padded: Vec<f64> = counts.iter().map(|c| c + 1e-8).collect();
    let total: f64 = padded.iter().sum();
    -padded
        .iter()
        .map(|c| c / total)
        .map(|p| p * p.ln())
        .sum::<f64>()
}
