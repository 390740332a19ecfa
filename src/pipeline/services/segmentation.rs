//! Landmark-driven rectangular face regions.
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::types::landmarks::LandmarkSet;
use crate::pipeline::types::region::{PixelRect, Region, RegionMask, SkinMask};

#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Landmark bounding box clamped to the image.
    pub face: PixelRect,
    pub regions: Vec<RegionMask>,
    pub skin: SkinMask,
}

/// Derives the named regions as fixed fractions of the landmark bounding box.
#[derive(Debug, Clone, Default)]
pub struct RegionSegmenter;

impl RegionSegmenter {
    pub fn new() -> Self {
        Self
    }

    pub fn face_box(landmarks: &LandmarkSet, width: u32, height: u32) -> PixelRect {
        let (min_x, min_y, max_x, max_y) = landmarks.bounds();
        let clamp = |v: f32, limit: u32| v.floor().clamp(0.0, limit as f32) as u32;
        PixelRect::from_corners(
            clamp(min_x, width),
            clamp(min_y, height),
            clamp(max_x + 1.0, width),
            clamp(max_y + 1.0, height),
        )
    }

    pub fn region_rect(region: Region, face: PixelRect, width: u32, height: u32) -> PixelRect {
        let (x0, x1, y0, y1) = region.fractions();
        let offset = |origin: u32, extent: u32, fraction: f32| {
            origin + (fraction * extent as f32).floor() as u32
        };
        PixelRect::from_corners(
            offset(face.x, face.width, x0).min(width),
            offset(face.y, face.height, y0).min(height),
            offset(face.x, face.width, x1).min(width),
            offset(face.y, face.height, y1).min(height),
        )
    }

    pub fn segment(
        &self,
        landmarks: &LandmarkSet,
        width: u32,
        height: u32,
    ) -> Result<Segmentation, PipelineError> {
        let face = Self::face_box(landmarks, width, height);
        if face.is_empty() {
            return Err(PipelineError::Segmentation(format!(
                "landmarks do not overlap the {}x{} image",
                width, height
            )));
        }

        let regions: Vec<RegionMask> = Region::ALL
            .iter()
            .map(|&region| {
                RegionMask::new(
                    region,
                    Self::region_rect(region, face, width, height),
                    width,
                    height,
                )
            })
            .collect();
        let skin = SkinMask::from_regions(&regions, width, height);
        if skin.pixel_count() == 0 {
            return Err(PipelineError::Segmentation(
                "face box too small to hold any region".to_string(),
            ));
        }

        debug!(
            "Face box {:?}, {} skin pixels",
            face,
            skin.pixel_count()
        );
        Ok(Segmentation {
            face,
            regions,
            skin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::square_landmarks;
    use crate::pipeline::types::landmarks::Landmark;

    #[test]
    fn test_region_fractions_of_face_box() {
        let landmarks = square_landmarks(10.0, 10.0, 300.0);
        let segmentation = RegionSegmenter::new().segment(&landmarks, 320, 320).unwrap();
        assert_eq!(segmentation.face, PixelRect::new(10, 10, 301, 301));

        let cheek = &segmentation.regions[2];
        assert_eq!(cheek.region, Region::CheekLeft);
        assert_eq!(cheek.rect, PixelRect::from_corners(25, 115, 115, 220));

        let chin = &segmentation.regions[4];
        assert_eq!(chin.rect, PixelRect::from_corners(70, 256, 250, 311));
    }

    #[test]
    fn test_regions_stay_inside_image() {
        // Face box spills over the bottom-right corner.
        let landmarks = square_landmarks(100.0, 100.0, 400.0);
        let segmentation = RegionSegmenter::new().segment(&landmarks, 320, 240).unwrap();
        for region in &segmentation.regions {
            assert!(region.rect.right() <= 320);
            assert!(region.rect.bottom() <= 240);
            assert_eq!(region.mask().dimensions(), (320, 240));
        }
    }

    #[test]
    fn test_skin_is_union_of_regions() {
        let landmarks = square_landmarks(5.0, 20.0, 150.0);
        let segmentation = RegionSegmenter::new().segment(&landmarks, 200, 200).unwrap();
        for y in 0..200 {
            for x in 0..200 {
                let any = segmentation.regions.iter().any(|r| r.contains(x, y));
                assert_eq!(segmentation.skin.contains(x, y), any);
            }
        }
    }

    #[test]
    fn test_landmarks_outside_image_fail() {
        let points = (0..468).map(|i| Landmark::new(500.0 + i as f32, 500.0, 0.0)).collect();
        let landmarks = LandmarkSet::new(points).unwrap();
        let result = RegionSegmenter::new().segment(&landmarks, 320, 320);
        assert!(matches!(result, Err(PipelineError::Segmentation(_))));
    }
}
