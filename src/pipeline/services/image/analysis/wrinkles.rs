//! Wrinkle density from an oriented Gabor ridge response.
use image::GrayImage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::config::{
    AnalysisConfig, GABOR_ASPECT, WRINKLE_ORIENTATIONS_DEG, WRINKLE_SCALES, WRINKLE_WAVELENGTH,
};
use super::core::{AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary::{self, Structuring};
use crate::pipeline::services::image::float_map::{FloatMap, Kernel};
use crate::pipeline::types::region::{PixelRect, Region, RegionMask};

/// Bank of real Gabor kernels applied as a pixelwise maximum.
#[derive(Debug, Clone)]
pub struct GaborBank {
    kernels: Vec<Kernel>,
}

impl GaborBank {
    pub fn new(kernels: Vec<Kernel>) -> Self {
        Self { kernels }
    }

    /// Ridge bank: every scale at every orientation, kernel size `6 sigma`.
    pub fn ridge() -> Self {
        let kernels = WRINKLE_SCALES
            .iter()
            .flat_map(|&sigma| {
                WRINKLE_ORIENTATIONS_DEG.iter().map(move |&degrees| {
                    Kernel::gabor(
                        (6.0 * sigma) as usize,
                        sigma,
                        degrees.to_radians(),
                        WRINKLE_WAVELENGTH,
                        GABOR_ASPECT,
                        0.0,
                    )
                })
            })
            .collect();
        Self::new(kernels)
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    pub fn max_radius(&self) -> u32 {
        self.kernels.iter().map(|k| k.size() / 2).max().unwrap_or(0) as u32
    }

    /// Per-pixel maximum response, floored at zero, evaluated inside `roi`.
    pub fn max_response(&self, source: &FloatMap, roi: PixelRect) -> FloatMap {
        let mut acc = FloatMap::new(source.width(), source.height());
        for kernel in &self.kernels {
            let response = source.correlate_within(kernel, roi);
            acc = acc.zip_map(&response, f32::max);
        }
        acc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionWrinkles {
    pub density: f64,
    pub wrinkle_pixels: u64,
}

#[derive(Debug, Clone)]
pub struct WrinkleFindings {
    pub regions: IndexMap<Region, RegionWrinkles>,
    /// Union of every region's wrinkle mask.
    pub mask: GrayImage,
}

impl WrinkleFindings {
    pub fn mean_density(&self) -> f64 {
        if self.regions.is_empty() {
            return 0.0;
        }
        self.regions.values().map(|r| r.density).sum::<f64>() / self.regions.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct WrinkleAnalyzer {
    bank: GaborBank,
    threshold: f32,
}

impl WrinkleAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            bank: GaborBank::ridge(),
            threshold: config.wrinkle_threshold,
        }
    }

    /// Ridge response over the skin area, normalized to `[0, 1]`.
    pub fn ridge_map(&self, context: &AnalysisContext) -> FloatMap {
        let roi = context.filter_roi();
        self.bank
            .max_response(&context.gray, roi)
            .normalized_within(roi)
    }

    /// Wrinkle mask and density for one region of a precomputed ridge map.
    pub fn analyze_region(&self, ridge: &FloatMap, region: &RegionMask) -> (GrayImage, f64) {
        let raw = binary::from_predicate(ridge.width(), ridge.height(), |x, y| {
            region.contains(x, y) && ridge.get(x, y) > self.threshold
        });
        let mask = binary::open(&raw, Structuring::Square);
        let density = binary::count_set(&mask) as f64 / (region.pixel_count() as f64 + 1e-6);
        (mask, density)
    }
}

impl ModalityAnalyzer for WrinkleAnalyzer {
    type Output = WrinkleFindings;

    fn name(&self) -> &'static str {
        "wrinkles"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<WrinkleFindings, PipelineError> {
        let ridge = self.ridge_map(context);
        let (width, height) = context.dimensions();
        let mut union = GrayImage::new(width, height);
        let mut regions = IndexMap::new();

        for region in context.regions.iter() {
            let (mask, density) = self.analyze_region(&ridge, region);
            binary::union_into(&mut union, &mask);
            regions.insert(
                region.region,
                RegionWrinkles {
                    density,
                    wrinkle_pixels: binary::count_set(&mask),
                },
            );
        }

        Ok(WrinkleFindings {
            regions,
            mask: union,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::*;

    #[test]
    fn test_ridge_bank_shape() {
        let bank = GaborBank::ridge();
        assert_eq!(bank.kernels().len(), 12);
        assert_eq!(bank.max_radius(), 15);
    }

    #[test]
    fn test_uniform_skin_has_no_wrinkles() {
        let context = context_for(uniform_image(320, 320, [128, 128, 128]));
        let findings = WrinkleAnalyzer::new(&AnalysisConfig::default())
            .analyze(&context)
            .unwrap();
        assert_eq!(findings.regions.len(), 5);
        assert_eq!(findings.mean_density(), 0.0);
        assert_eq!(binary::count_set(&findings.mask), 0);
    }

    #[test]
    fn test_line_pattern_has_density() {
        let image = RgbImage::from_fn(320, 320, |_, y| {
            if y % 16 < 4 {
                Rgb([60, 60, 60])
            } else {
                Rgb([180, 180, 180])
            }
        });
        let context = context_for(image);
        let findings = WrinkleAnalyzer::new(&AnalysisConfig::default())
            .analyze(&context)
            .unwrap();

        assert!(findings.mean_density() > 0.0);
        assert!(findings.regions.values().all(|r| r.density <= 1.0));
        assert!(binary::count_set(&findings.mask) > 0);
    }
}
