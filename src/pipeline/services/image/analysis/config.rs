use serde::{Deserialize, Serialize};

// Empirical tuning constants. Changing any of these needs re-validation
// against reference photographs.

// Illumination
pub const RETINEX_SCALES: [f32; 3] = [15.0, 80.0, 250.0];
pub const RETINEX_RESTORATION_GAIN: f32 = 46.0;
/// Output range below which retinex is considered degenerate and skipped.
pub const RETINEX_MIN_RANGE: f32 = 1e-2;
/// Blurs wider than this run on a downsampled copy.
pub const RETINEX_DIRECT_BLUR_SIGMA: f32 = 8.0;
pub const GAMMA_DARK_LUMINANCE: f32 = 0.4;
pub const GAMMA_MID_LUMINANCE: f32 = 0.6;
pub const GAMMA_DARK: f32 = 0.7;
pub const GAMMA_MID: f32 = 1.0;
pub const GAMMA_BRIGHT: f32 = 1.2;
pub const SPECULAR_MIN_VALUE: f32 = 245.0;
pub const SPECULAR_MAX_SATURATION: f32 = 25.0;

// Acne
pub const ACNE_REDNESS_WEIGHT: f32 = 0.7;
pub const ACNE_DARKNESS_WEIGHT: f32 = 0.3;

// Pigmentation
pub const SHADING_EDGE_THRESHOLD: f32 = 0.6;

// Wrinkles
pub const WRINKLE_SCALES: [f32; 2] = [3.0, 5.0];
pub const WRINKLE_ORIENTATIONS_DEG: [f32; 6] = [0.0, 30.0, 60.0, 90.0, 120.0, 150.0];
pub const WRINKLE_WAVELENGTH: f32 = 10.0;
pub const GABOR_ASPECT: f32 = 0.5;

// Hydration
pub const HYDRATION_ORIENTATIONS_DEG: [f32; 4] = [0.0, 45.0, 90.0, 135.0];
pub const HYDRATION_FREQUENCIES: [f32; 3] = [0.1, 0.3, 0.5];
pub const HYDRATION_KERNEL_SIZE: usize = 15;
pub const HYDRATION_KERNEL_SIGMA: f32 = 3.0;
pub const HYDRATION_PORE_PERCENTILE: f32 = 90.0;
pub const HYDRATION_SMOOTHNESS_WINDOWS: [usize; 3] = [5, 9, 15];
pub const HYDRATION_TEXTURE_SCALE: f32 = 20.0;
pub const HYDRATION_HEATMAP_TEXTURE_SCALE: f32 = 50.0;
pub const HYDRATION_ROUGHNESS_SCALE: f32 = 30.0;
pub const HYDRATION_PORE_DENSITY_SCALE: f32 = 0.1;
pub const HYDRATION_SIGNAL_WEIGHT: f32 = 0.25;

// Pores
pub const PORE_RESPONSE_PERCENTILE: f32 = 85.0;
pub const PORE_CLOGGING_PERCENTILE: f32 = 75.0;
pub const PORE_SMALL_AREA: f32 = 10.0;
pub const PORE_MEDIUM_AREA: f32 = 25.0;
pub const PORE_DARKNESS_SCALE: f32 = 50.0;
pub const PORE_SIZE_SCALE: f32 = 30.0;
pub const PORE_SIZE_PENALTY_SCALE: f32 = 40.0;
pub const PORE_CLOGGING_PENALTY: f32 = 0.5;
pub const PORE_SIZE_PENALTY: f32 = 0.3;
/// Heatmap contributions of pore health, absence of clogging and pore size.
pub const PORE_HEATMAP_WEIGHTS: [f32; 3] = [0.4, 0.3, 0.3];
pub const PORE_HEATMAP_SIZE_SCALE: f32 = 50.0;

// UV damage
pub const UV_VARIATION_PERCENTILE: f32 = 85.0;
pub const UV_ADAPTIVE_BLOCK: usize = 11;
pub const UV_ADAPTIVE_OFFSET: f32 = 2.0;
pub const UV_VARIATION_SCALE: f32 = 0.1;
pub const UV_FRECKLE_DENSITY_SCALE: f32 = 0.05;
pub const UV_DEVIATION_SIGMAS: f32 = 2.0;
pub const UV_WEIGHTS: [f32; 3] = [0.4, 0.3, 0.3];

/// Tunables that deployments commonly adjust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// CIE76 distance from the baseline skin color that flags pigmentation.
    pub pigmentation_tau: f32,
    /// Normalized ridge response above which a pixel is a wrinkle.
    pub wrinkle_threshold: f32,
    pub acne_min_area: u32,
    pub acne_max_area: u32,
    /// Confidence attached to classical acne detections.
    pub acne_fallback_confidence: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pigmentation_tau: 8.0,
            wrinkle_threshold: 0.65,
            acne_min_area: 6,
            acne_max_area: 400,
            acne_fallback_confidence: 0.3,
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.pigmentation_tau <= 0.0 {
            return Err("Pigmentation tau must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.wrinkle_threshold) {
            return Err("Wrinkle threshold must be between 0.0 and 1.0".to_string());
        }

        if self.acne_min_area > self.acne_max_area {
            return Err("Acne minimum area must not exceed the maximum area".to_string());
        }

        if !(0.0..=1.0).contains(&self.acne_fallback_confidence) {
            return Err("Acne fallback confidence must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }

    pub fn with_pigmentation_tau(mut self, tau: f32) -> Self {
        self.pigmentation_tau = tau;
        self
    }

    pub fn with_wrinkle_threshold(mut self, threshold: f32) -> Self {
        self.wrinkle_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(AnalysisConfig::default().with_pigmentation_tau(0.0).validate().is_err());

        let inverted = AnalysisConfig {
            acne_min_area: 500,
            ..AnalysisConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_wrinkle_threshold_is_clamped() {
        let config = AnalysisConfig::default().with_wrinkle_threshold(3.0);
        assert_eq!(config.wrinkle_threshold, 1.0);
    }
}
