//! Acne lesion detection with a learned backend and a classical fallback.
use std::fmt;
use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::filter::median_filter;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::{AnalysisConfig, ACNE_DARKNESS_WEIGHT, ACNE_REDNESS_WEIGHT};
use super::core::{AnalysisContext, ModalityAnalyzer};
use crate::error::PipelineError;
use crate::pipeline::services::image::binary::{self, Component, Structuring};
use crate::pipeline::services::image::color::LabPlanes;
use crate::pipeline::services::image::float_map::{min_max, FloatMap, NORMALIZE_EPSILON};
use crate::pipeline::types::detection::Detection;
use crate::pipeline::types::region::{Region, RegionMask, MASK_ON};

/// Opaque per-pixel lesion scorer backing the learned detection path.
pub trait LesionModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Lesion probability in `[0, 1]` for one CIE L*a*b* pixel.
    fn lesion_probability(&self, lab: [f32; 3]) -> f32;

    /// Probability above which a pixel is lesion foreground.
    fn threshold(&self) -> f32;
}

/// Logistic classifier over L*a*b*, stored as a JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPixelModel {
    pub weights: [f32; 3],
    pub bias: f32,
    #[serde(default = "LinearPixelModel::default_threshold")]
    pub threshold: f32,
}

impl LinearPixelModel {
    fn default_threshold() -> f32 {
        0.5
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Model(format!("cannot read {}: {}", path.display(), e)))?;
        let model: Self = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Model(format!("invalid model {}: {}", path.display(), e)))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if !self.weights.iter().chain([&self.bias]).all(|v| v.is_finite()) {
            return Err(PipelineError::Model("model parameters must be finite".to_string()));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(PipelineError::Model(format!(
                "model threshold {} outside (0, 1)",
                self.threshold
            )));
        }
        Ok(())
    }
}

impl LesionModel for LinearPixelModel {
    fn name(&self) -> &'static str {
        "linear_pixel"
    }

    fn lesion_probability(&self, lab: [f32; 3]) -> f32 {
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(lab.iter())
                .map(|(w, v)| w * v)
                .sum::<f32>();
        1.0 / (1.0 + (-z).exp())
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Detection strategy, chosen once when the detector is built.
#[derive(Debug)]
pub enum AcneBackend {
    Learned(Box<dyn LesionModel>),
    Classical,
}

/// Acne findings for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcneFindings {
    pub detections: Vec<Detection>,
    /// Sum of detection bounding-box areas in pixels.
    pub lesion_area: u64,
}

impl AcneFindings {
    /// Detections per region; a detection counts toward the first region containing its centroid.
    pub fn region_counts(&self, regions: &[RegionMask]) -> IndexMap<Region, u32> {
        let mut counts: IndexMap<Region, u32> = regions.iter().map(|r| (r.region, 0)).collect();
        for detection in &self.detections {
            if let Some(region) = detection.assign_region(regions) {
                *counts.entry(region).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn assigned_count(&self, regions: &[RegionMask]) -> u32 {
        self.region_counts(regions).values().sum()
    }

    /// Lesion area as a fraction of the skin area.
    pub fn lesion_area_norm(&self, skin_pixels: u64) -> f64 {
        self.lesion_area as f64 / (skin_pixels as f64 + 1e-6)
    }
}

#[derive(Debug)]
pub struct AcneDetector {
    backend: AcneBackend,
    min_area: u32,
    max_area: u32,
    fallback_confidence: f32,
}

impl AcneDetector {
    pub fn classical(config: &AnalysisConfig) -> Self {
        Self {
            backend: AcneBackend::Classical,
            min_area: config.acne_min_area,
            max_area: config.acne_max_area,
            fallback_confidence: config.acne_fallback_confidence,
        }
    }

    pub fn with_model(model: Box<dyn LesionModel>, config: &AnalysisConfig) -> Self {
        Self {
            backend: AcneBackend::Learned(model),
            ..Self::classical(config)
        }
    }

    /// Uses the model at `path` when it loads, otherwise the classical path.
    pub fn from_model_path(path: Option<&Path>, config: &AnalysisConfig) -> Self {
        let Some(path) = path else {
            info!("No acne model configured, using classical detector");
            return Self::classical(config);
        };

        match LinearPixelModel::load(path) {
            Ok(model) => {
                info!("Loaded acne model from {}", path.display());
                Self::with_model(Box::new(model), config)
            }
            Err(e) => {
                warn!("Falling back to classical acne detector: {}", e);
                Self::classical(config)
            }
        }
    }

    pub fn backend(&self) -> &AcneBackend {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            AcneBackend::Learned(model) => model.name(),
            AcneBackend::Classical => "classical",
        }
    }

    fn keep(&self, component: &Component) -> bool {
        (self.min_area..=self.max_area).contains(&component.area)
    }

    fn to_detection(component: &Component, confidence: f32) -> Detection {
        Detection {
            bbox: component.bbox,
            area: component.area,
            centroid: component.rounded_centroid(),
            confidence,
        }
    }

    /// Redness plus darkness composite, Otsu-thresholded over skin pixels.
    fn detect_classical(&self, context: &AnalysisContext) -> Vec<Detection> {
        let blurred = median_filter(context.image.as_ref(), 1, 1);
        let lab = LabPlanes::from_rgb(&blurred);
        let skin = context.skin.mask();
        let (width, height) = blurred.dimensions();

        let skin_a = lab.a.values_where(skin);
        let (a_min, a_max) = min_max(&skin_a);

        let mut score = GrayImage::new(width, height);
        let mut skin_scores = Vec::with_capacity(skin_a.len());
        for (x, y, out) in score.enumerate_pixels_mut() {
            if !context.skin.contains(x, y) {
                continue;
            }
            let redness = (lab.a.get(x, y) - a_min) / (a_max - a_min + NORMALIZE_EPSILON) * 255.0;
            let darkness = 255.0 - lab.l.get(x, y) * 255.0 / 100.0;
            let value = (ACNE_REDNESS_WEIGHT * redness + ACNE_DARKNESS_WEIGHT * darkness)
                .round()
                .clamp(0.0, 255.0) as u8;
            out[0] = value;
            skin_scores.push(value);
        }

        let level = binary::otsu_of(&skin_scores);
        debug!("Acne composite Otsu level {}", level);
        let mut foreground = score;
        for (x, y, pixel) in foreground.enumerate_pixels_mut() {
            *pixel = if context.skin.contains(x, y) && pixel[0] > level {
                Luma([MASK_ON])
            } else {
                Luma([0])
            };
        }

        let cleaned = binary::open(&foreground, Structuring::Square);
        binary::label_components(&cleaned)
            .components
            .iter()
            .filter(|c| self.keep(c))
            .map(|c| Self::to_detection(c, self.fallback_confidence))
            .collect()
    }

    /// Threshold the model's per-pixel probability; confidence is the mean over each component.
    fn detect_learned(
        &self,
        model: &dyn LesionModel,
        context: &AnalysisContext,
    ) -> Result<Vec<Detection>, PipelineError> {
        let (width, height) = context.dimensions();
        let probability = FloatMap::from_fn(width, height, |x, y| {
            if !context.skin.contains(x, y) {
                return 0.0;
            }
            model.lesion_probability([
                context.lab.l.get(x, y),
                context.lab.a.get(x, y),
                context.lab.b.get(x, y),
            ])
        });
        if let Some(index) = probability.data().iter().position(|p| !p.is_finite()) {
            let (x, y) = (index as u32 % width, index as u32 / width);
            return Err(PipelineError::Model(format!(
                "{} produced a non-finite probability at ({}, {})",
                model.name(),
                x,
                y
            )));
        }

        let foreground = binary::from_predicate(width, height, |x, y| {
            context.skin.contains(x, y) && probability.get(x, y) > model.threshold()
        });
        let cleaned = binary::open(&foreground, Structuring::Square);
        let found = binary::label_components(&cleaned);

        let mut sums = vec![0.0f64; found.components.len() + 1];
        let index_of: IndexMap<u32, usize> = found
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.label, i))
            .collect();
        for (x, y, label) in found.labels.enumerate_pixels() {
            if let Some(&i) = index_of.get(&label[0]) {
                sums[i] += probability.get(x, y) as f64;
            }
        }

        Ok(found
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| self.keep(c))
            .map(|(i, c)| Self::to_detection(c, (sums[i] / c.area as f64) as f32))
            .collect())
    }
}

impl ModalityAnalyzer for AcneDetector {
    type Output = AcneFindings;

    fn name(&self) -> &'static str {
        "acne"
    }

    fn analyze(&self, context: &AnalysisContext) -> Result<AcneFindings, PipelineError> {
        let detections = match &self.backend {
            AcneBackend::Learned(model) => self.detect_learned(model.as_ref(), context)?,
            AcneBackend::Classical => self.detect_classical(context),
        };
        let lesion_area = detections.iter().map(|d| d.bbox.area()).sum();
        debug!(
            "Acne backend {} found {} detections",
            self.backend_name(),
            detections.len()
        );
        Ok(AcneFindings {
            detections,
            lesion_area,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::*;

    fn spotted_image() -> RgbImage {
        RgbImage::from_fn(320, 320, |x, y| {
            let dx = x as i32 - 70;
            let dy = y as i32 - 160;
            if dx * dx + dy * dy <= 16 {
                Rgb([150, 40, 50])
            } else {
                Rgb([200, 160, 140])
            }
        })
    }

    #[test]
    fn test_uniform_skin_has_no_lesions() {
        let context = context_for(uniform_image(320, 320, [128, 128, 128]));
        let detector = AcneDetector::classical(&AnalysisConfig::default());
        let findings = detector.analyze(&context).unwrap();
        assert!(findings.detections.is_empty());
        assert_eq!(findings.lesion_area, 0);
    }

    #[test]
    fn test_red_spot_is_detected_in_left_cheek() {
        let context = context_for(spotted_image());
        let detector = AcneDetector::classical(&AnalysisConfig::default());
        let findings = detector.analyze(&context).unwrap();

        assert_eq!(findings.detections.len(), 1);
        let detection = &findings.detections[0];
        assert_eq!(detection.confidence, 0.3);
        assert!((6..=400).contains(&detection.area));

        let counts = findings.region_counts(&context.regions);
        assert_eq!(counts[&Region::CheekLeft], 1);
        assert_eq!(findings.assigned_count(&context.regions), 1);
    }

    #[test]
    fn test_learned_backend_uses_model_probability() {
        // Fires on strongly red pixels only.
        let model = LinearPixelModel {
            weights: [0.0, 1.0, 0.0],
            bias: -30.0,
            threshold: 0.5,
        };
        let detector = AcneDetector::with_model(Box::new(model), &AnalysisConfig::default());
        assert_eq!(detector.backend_name(), "linear_pixel");

        let findings = detector.analyze(&context_for(spotted_image())).unwrap();
        assert_eq!(findings.detections.len(), 1);
        assert!(findings.detections[0].confidence > 0.5);
    }

    #[test]
    fn test_non_finite_probability_is_a_model_error() {
        let model = Box::new(GreenFaultModel::NonFinite);
        let detector = AcneDetector::with_model(model, &AnalysisConfig::default());
        let green = detector.analyze(&context_for(uniform_image(320, 320, [0, 200, 0])));
        assert!(matches!(green, Err(PipelineError::Model(ref m)) if m.contains("green_fault")));

        let gray = detector
            .analyze(&context_for(uniform_image(320, 320, [128, 128, 128])))
            .unwrap();
        assert!(gray.detections.is_empty());
    }

    #[test]
    fn test_unloadable_model_falls_back() {
        let missing = std::env::temp_dir().join(format!("{}.json", uuid::Uuid::new_v4()));
        let detector = AcneDetector::from_model_path(Some(&missing), &AnalysisConfig::default());
        assert!(matches!(detector.backend(), AcneBackend::Classical));

        let detector = AcneDetector::from_model_path(None, &AnalysisConfig::default());
        assert_eq!(detector.backend_name(), "classical");
    }

    #[test]
    fn test_model_loads_from_json() {
        let path = std::env::temp_dir().join(format!("{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"weights": [0.0, 0.2, 0.0], "bias": -4.0}"#).unwrap();
        let model = LinearPixelModel::load(&path).unwrap();
        assert_eq!(model.threshold, 0.5);

        let detector = AcneDetector::from_model_path(Some(&path), &AnalysisConfig::default());
        assert!(matches!(detector.backend(), AcneBackend::Learned(_)));
        std::fs::remove_file(&path).ok();
    }
}
