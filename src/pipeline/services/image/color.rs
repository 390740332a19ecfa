//! Per-pixel color space planes built with `palette`.

use image::{Rgb, RgbImage};
use palette::{FromColor, Hsv, Lab, Srgb};

use super::float_map::FloatMap;

pub fn rgb_to_lab(pixel: &Rgb<u8>) -> Lab {
    let srgb: Srgb<f32> = Srgb::new(pixel[0], pixel[1], pixel[2]).into_format();
    Lab::from_color(srgb)
}

pub fn lab_to_rgb(lab: Lab) -> Rgb<u8> {
    let srgb: Srgb<u8> = Srgb::from_color(lab).into_format();
    Rgb([srgb.red, srgb.green, srgb.blue])
}

/// CIE L*a*b* (D65) planes: L in `[0, 100]`, a/b roughly `[-128, 127]`.
#[derive(Debug, Clone)]
pub struct LabPlanes {
    pub l: FloatMap,
    pub a: FloatMap,
    pub b: FloatMap,
}

impl LabPlanes {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut l = FloatMap::new(width, height);
        let mut a = FloatMap::new(width, height);
        let mut b = FloatMap::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels() {
            let lab = rgb_to_lab(pixel);
            l.set(x, y, lab.l);
            a.set(x, y, lab.a);
            b.set(x, y, lab.b);
        }
        Self { l, a, b }
    }

    /// Lightness rescaled to `[0, 255]`.
    pub fn lightness_8bit(&self) -> FloatMap {
        self.l.map(|v| v * 255.0 / 100.0)
    }

    pub fn distance_to(&self, x: u32, y: u32, reference: [f32; 3]) -> f32 {
        let dl = self.l.get(x, y) - reference[0];
        let da = self.a.get(x, y) - reference[1];
        let db = self.b.get(x, y) - reference[2];
        (dl * dl + da * da + db * db).sqrt()
    }
}

/// HSV planes: hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub h: FloatMap,
    pub s: FloatMap,
    pub v: FloatMap,
}

impl HsvPlanes {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut h = FloatMap::new(width, height);
        let mut s = FloatMap::new(width, height);
        let mut v = FloatMap::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels() {
            let srgb: Srgb<f32> = Srgb::new(pixel[0], pixel[1], pixel[2]).into_format();
            let hsv = Hsv::from_color(srgb);
            h.set(x, y, hsv.hue.into_positive_degrees());
            s.set(x, y, hsv.saturation);
            v.set(x, y, hsv.value);
        }
        Self { h, s, v }
    }

    /// Channels on the common 8-bit scale (hue halved to `[0, 180)`).
    pub fn to_8bit_scale(&self) -> [FloatMap; 3] {
        [
            self.h.map(|v| v / 2.0),
            self.s.map(|v| v * 255.0),
            self.v.map(|v| v * 255.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lab_of_gray_is_neutral() {
        let lab = rgb_to_lab(&Rgb([128, 128, 128]));
        assert!((lab.l - 53.6).abs() < 0.5);
        assert!(lab.a.abs() < 0.5);
        assert!(lab.b.abs() < 0.5);

        let back = lab_to_rgb(lab);
        assert!((back[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn test_red_has_positive_a() {
        let lab = rgb_to_lab(&Rgb([200, 40, 40]));
        assert!(lab.a > 40.0);
    }

    #[test]
    fn test_hsv_planes() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        let hsv = HsvPlanes::from_rgb(&image);
        assert_eq!(hsv.s.get(0, 0), 0.0);
        assert!((hsv.v.get(1, 1) - 1.0).abs() < 1e-6);

        let [_, s8, v8] = hsv.to_8bit_scale();
        assert_eq!(s8.get(0, 0), 0.0);
        assert!((v8.get(0, 0) - 255.0).abs() < 1e-3);
    }
}
