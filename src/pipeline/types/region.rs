use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Mask value for pixels inside a region.
pub const MASK_ON: u8 = 255;

/// Named facial skin regions, in assignment priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Forehead,
    Nose,
    CheekLeft,
    CheekRight,
    Chin,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Forehead,
        Region::Nose,
        Region::CheekLeft,
        Region::CheekRight,
        Region::Chin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Region::Forehead => "forehead",
            Region::Nose => "nose",
            Region::CheekLeft => "cheek_left",
            Region::CheekRight => "cheek_right",
            Region::Chin => "chin",
        }
    }

    /// `(x0, x1, y0, y1)` as fractions of the face bounding box.
    pub fn fractions(&self) -> (f32, f32, f32, f32) {
        match self {
            Region::Forehead => (0.20, 0.80, 0.00, 0.25),
            Region::Nose => (0.41, 0.59, 0.25, 0.65),
            Region::CheekLeft => (0.05, 0.35, 0.35, 0.70),
            Region::CheekRight => (0.65, 0.95, 0.35, 0.70),
            Region::Chin => (0.20, 0.80, 0.82, 1.00),
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open pixel rectangle `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full_image(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        PixelRect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Grow by `margin` on every side without leaving a `width` x `height` image.
    pub fn expand_within(&self, margin: u32, width: u32, height: u32) -> PixelRect {
        PixelRect::from_corners(
            self.x.saturating_sub(margin),
            self.y.saturating_sub(margin),
            (self.right() + margin).min(width),
            (self.bottom() + margin).min(height),
        )
    }
}

/// Filled rectangular mask for one named region, sized to the whole image.
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub region: Region,
    pub rect: PixelRect,
    mask: GrayImage,
}

impl RegionMask {
    pub fn new(region: Region, rect: PixelRect, width: u32, height: u32) -> Self {
        let mask = GrayImage::from_fn(width, height, |x, y| {
            if rect.contains_point(x, y) {
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });
        Self { region, rect, mask }
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y)[0] > 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.rect.area()
    }
}

/// Union of all region masks; the area every detector works over.
#[derive(Debug, Clone)]
pub struct SkinMask {
    mask: GrayImage,
    pixel_count: u64,
    bounds: PixelRect,
}

impl SkinMask {
    pub fn from_regions(regions: &[RegionMask], width: u32, height: u32) -> Self {
        let mut mask = GrayImage::new(width, height);
        let mut bounds = PixelRect::new(0, 0, 0, 0);
        for region in regions {
            bounds = bounds.union(&region.rect);
            for (out, value) in mask.pixels_mut().zip(region.mask().pixels()) {
                out[0] |= value[0];
            }
        }
        let pixel_count = mask.pixels().filter(|p| p[0] > 0).count() as u64;
        Self {
            mask,
            pixel_count,
            bounds,
        }
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y)[0] > 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    /// Bounding rectangle of all skin pixels.
    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_geometry() {
        let rect = PixelRect::new(10, 20, 5, 4);
        assert!(rect.contains_point(10, 20));
        assert!(rect.contains_point(14, 23));
        assert!(!rect.contains_point(15, 23));
        assert_eq!(rect.area(), 20);

        let grown = rect.expand_within(8, 20, 30);
        assert_eq!(grown, PixelRect::from_corners(2, 12, 20, 30));
        assert_eq!(rect.union(&PixelRect::new(0, 0, 0, 0)), rect);
    }

    #[test]
    fn test_skin_mask_is_union() {
        let a = RegionMask::new(Region::Forehead, PixelRect::new(0, 0, 4, 4), 10, 10);
        let b = RegionMask::new(Region::Nose, PixelRect::new(2, 2, 4, 4), 10, 10);
        let skin = SkinMask::from_regions(&[a.clone(), b.clone()], 10, 10);

        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(skin.contains(x, y), a.contains(x, y) || b.contains(x, y));
            }
        }
        assert_eq!(skin.pixel_count(), 16 + 16 - 4);
        assert_eq!(skin.bounds(), PixelRect::new(0, 0, 6, 6));
    }

    #[test]
    fn test_region_names_serialize_snake_case() {
        let json = serde_json::to_string(&Region::CheekLeft).unwrap();
        assert_eq!(json, "\"cheek_left\"");
        assert_eq!(Region::CheekRight.to_string(), "cheek_right");
    }
}
