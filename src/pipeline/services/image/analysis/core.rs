use std::sync::Arc;

use image::RgbImage;

use crate::error::PipelineError;
use crate::pipeline::services::image::color::{HsvPlanes, LabPlanes};
use crate::pipeline::services::image::float_map::FloatMap;
use crate::pipeline::types::region::{PixelRect, RegionMask, SkinMask};

/// Margin added around the skin bounds when restricting large filters.
const FILTER_MARGIN: u32 = 16;

/// Read-only inputs shared by every modality analyzer for one job.
///
/// Holds the normalized image plus the derived planes each detector needs,
/// so they are computed once per job rather than once per detector.
#[derive(Clone)]
pub struct AnalysisContext {
    pub image: Arc<RgbImage>,
    pub gray: FloatMap,
    pub lab: LabPlanes,
    pub hsv: HsvPlanes,
    pub regions: Arc<Vec<RegionMask>>,
    pub skin: Arc<SkinMask>,
}

impl AnalysisContext {
    pub fn new(image: RgbImage, regions: Vec<RegionMask>, skin: SkinMask) -> Self {
        let gray = FloatMap::luminance(&image);
        let lab = LabPlanes::from_rgb(&image);
        let hsv = HsvPlanes::from_rgb(&image);
        Self {
            image: Arc::new(image),
            gray,
            lab,
            hsv,
            regions: Arc::new(regions),
            skin: Arc::new(skin),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Skin bounds grown by a filter margin; large kernels only run here.
    pub fn filter_roi(&self) -> PixelRect {
        let (width, height) = self.dimensions();
        self.skin.bounds().expand_within(FILTER_MARGIN, width, height)
    }

    pub fn skin_pixels(&self) -> u64 {
        self.skin.pixel_count()
    }
}

/// Strategy interface implemented by each skin-condition modality.
pub trait ModalityAnalyzer: Send + Sync {
    type Output;

    fn name(&self) -> &'static str;
    fn analyze(&self, context: &AnalysisContext) -> Result<Self::Output, PipelineError>;
}

/// Round to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }

    #[test]
    fn test_filter_roi_covers_skin() {
        let context = context_for(uniform_image(320, 320, [128, 128, 128]));
        let roi = context.filter_roi();
        let skin = context.skin.bounds();
        assert!(roi.x <= skin.x && roi.y <= skin.y);
        assert!(roi.right() >= skin.right() && roi.bottom() >= skin.bottom());
        assert!(roi.right() <= 320 && roi.bottom() <= 320);
    }
}
