use serde::{Deserialize, Serialize};

use super::region::{Region, RegionMask};

/// Inclusive-exclusive box `[x1, x2) x [y1, y2)` in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// One located acne finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Foreground pixel count of the component.
    pub area: u32,
    /// Pixel centroid, rounded.
    pub centroid: (u32, u32),
    pub confidence: f32,
}

impl Detection {
    /// First region whose mask is set at the centroid.
    pub fn assign_region(&self, regions: &[RegionMask]) -> Option<Region> {
        let (cx, cy) = self.centroid;
        regions
            .iter()
            .find(|mask| mask.contains(cx, cy))
            .map(|mask| mask.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::region::PixelRect;

    #[test]
    fn test_first_matching_region_wins() {
        let forehead = RegionMask::new(Region::Forehead, PixelRect::new(0, 0, 10, 10), 20, 20);
        let nose = RegionMask::new(Region::Nose, PixelRect::new(5, 5, 10, 10), 20, 20);
        let detection = Detection {
            bbox: BoundingBox {
                x1: 6,
                y1: 6,
                x2: 9,
                y2: 9,
            },
            area: 9,
            centroid: (7, 7),
            confidence: 0.3,
        };
        assert_eq!(
            detection.assign_region(&[forehead.clone(), nose.clone()]),
            Some(Region::Forehead)
        );
        assert_eq!(detection.assign_region(&[nose, forehead]), Some(Region::Nose));
        assert_eq!(detection.bbox.area(), 9);
    }

    #[test]
    fn test_outside_every_region() {
        let chin = RegionMask::new(Region::Chin, PixelRect::new(0, 0, 2, 2), 20, 20);
        let detection = Detection {
            bbox: BoundingBox {
                x1: 10,
                y1: 10,
                x2: 12,
                y2: 12,
            },
            area: 4,
            centroid: (11, 11),
            confidence: 0.3,
        };
        assert_eq!(detection.assign_region(&[chin]), None);
    }
}
