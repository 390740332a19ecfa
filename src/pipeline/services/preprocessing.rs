//! Illumination normalization applied before every detector.
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::pipeline::services::image::analysis::config::{
    GAMMA_BRIGHT, GAMMA_DARK, GAMMA_DARK_LUMINANCE, GAMMA_MID, GAMMA_MID_LUMINANCE,
    RETINEX_DIRECT_BLUR_SIGMA, RETINEX_MIN_RANGE, RETINEX_RESTORATION_GAIN, RETINEX_SCALES,
    SPECULAR_MAX_SATURATION, SPECULAR_MIN_VALUE,
};
use crate::pipeline::services::image::binary::{self, Structuring};
use crate::pipeline::services::image::color::HsvPlanes;
use crate::pipeline::services::image::float_map::{mean, min_max, FloatMap};

/// Result of preprocessing one image.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: RgbImage,
    pub retinex_applied: bool,
    pub gamma: f32,
    pub specular_pixels: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Retinex, then gamma, then specular suppression. A failing stage passes its input through.
    pub fn run(&self, image: &RgbImage) -> Preprocessed {
        let (normalized, retinex_applied) = match self.retinex(image) {
            Ok(Some(out)) => (out, true),
            Ok(None) => (image.clone(), false),
            Err(e) => {
                warn!("Retinex stage skipped: {}", e);
                (image.clone(), false)
            }
        };

        let gamma = Self::select_gamma(&normalized);
        let corrected = Self::apply_gamma(&normalized, gamma);

        let (image, specular_pixels) = match self.suppress_specular(&corrected) {
            Ok(result) => result,
            Err(e) => {
                warn!("Specular stage skipped: {}", e);
                (corrected, 0)
            }
        };
        debug!(
            "Preprocessed: retinex={}, gamma={}, specular_pixels={}",
            retinex_applied, gamma, specular_pixels
        );

        Preprocessed {
            image,
            retinex_applied,
            gamma,
            specular_pixels,
        }
    }

    /// Multi-scale retinex with color restoration, stretched to `[0, 255]`.
    ///
    /// Returns `None` when the output range collapses, which happens for flat images.
    pub fn retinex(&self, image: &RgbImage) -> Result<Option<RgbImage>, PipelineError> {
        let (width, height) = image.dimensions();
        let shifted: Rgb32FImage = ImageBuffer::from_fn(width, height, |x, y| {
            let p = image.get_pixel(x, y);
            Rgb([p[0] as f32 + 1.0, p[1] as f32 + 1.0, p[2] as f32 + 1.0])
        });

        let weight = 1.0 / RETINEX_SCALES.len() as f32;
        let mut msr = vec![0.0f32; shifted.as_raw().len()];
        for sigma in RETINEX_SCALES {
            let blurred = blur_large(&shifted, sigma);
            if blurred.as_raw().len() != msr.len() {
                return Err(PipelineError::processing(
                    "retinex",
                    format!("blur at sigma {} changed the buffer size", sigma),
                ));
            }
            for ((acc, v), b) in msr.iter_mut().zip(shifted.as_raw()).zip(blurred.as_raw()) {
                *acc += weight * (v.ln() - (b + 1.0).ln());
            }
        }

        let gain = RETINEX_RESTORATION_GAIN;
        let mut restored = Vec::with_capacity(msr.len());
        for (pixel, retinex) in shifted.as_raw().chunks_exact(3).zip(msr.chunks_exact(3)) {
            let sum: f32 = pixel.iter().sum();
            for (v, r) in pixel.iter().zip(retinex) {
                restored.push(gain * ((gain * v).ln() - (sum + 1.0).ln()) * r);
            }
        }

        let (lo, hi) = min_max(&restored);
        if !(hi - lo).is_finite() || hi - lo < RETINEX_MIN_RANGE {
            debug!("Retinex output range {} too small, keeping input", hi - lo);
            return Ok(None);
        }

        let raw = restored
            .iter()
            .map(|v| ((v - lo) / (hi - lo) * 255.0).clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(width, height, raw)
            .map(Some)
            .ok_or_else(|| PipelineError::processing("retinex", "output buffer size mismatch"))
    }

    pub fn select_gamma(image: &RgbImage) -> f32 {
        let luminance = FloatMap::luminance(image);
        let level = mean(luminance.data()) / 255.0;
        if level < GAMMA_DARK_LUMINANCE {
            GAMMA_DARK
        } else if level < GAMMA_MID_LUMINANCE {
            GAMMA_MID
        } else {
            GAMMA_BRIGHT
        }
    }

    pub fn apply_gamma(image: &RgbImage, gamma: f32) -> RgbImage {
        let inverse = 1.0 / gamma;
        let lut: Vec<u8> = (0..=255u32)
            .map(|i| ((i as f32 / 255.0).powf(inverse) * 255.0).round() as u8)
            .collect();
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = lut[*channel as usize];
            }
        }
        out
    }

    /// Fills near-white, low-saturation highlights from their surroundings.
    pub fn suppress_specular(&self, image: &RgbImage) -> Result<(RgbImage, u64), PipelineError> {
        let (width, height) = image.dimensions();
        let [_, saturation, value] = HsvPlanes::from_rgb(image).to_8bit_scale();
        let highlights = binary::from_predicate(width, height, |x, y| {
            value.get(x, y) > SPECULAR_MIN_VALUE && saturation.get(x, y) < SPECULAR_MAX_SATURATION
        });
        let mask = binary::close(&highlights, Structuring::Square);
        let flagged = binary::count_set(&mask);
        if flagged == 0 {
            return Ok((image.clone(), 0));
        }
        if flagged == width as u64 * height as u64 {
            return Err(PipelineError::processing(
                "specular",
                "every pixel is a highlight, nothing to inpaint from",
            ));
        }
        Ok((inpaint(image, &mask), flagged))
    }
}

/// Gaussian blur; wide kernels run on a downsampled copy and are scaled back up.
fn blur_large(image: &Rgb32FImage, sigma: f32) -> Rgb32FImage {
    let factor = (sigma / RETINEX_DIRECT_BLUR_SIGMA).ceil().max(1.0) as u32;
    if factor <= 1 {
        return gaussian_blur_f32(image, sigma);
    }
    let (width, height) = image.dimensions();
    let small = imageops::resize(
        image,
        (width / factor).max(1),
        (height / factor).max(1),
        FilterType::Triangle,
    );
    let blurred = gaussian_blur_f32(&small, sigma / factor as f32);
    imageops::resize(&blurred, width, height, FilterType::Triangle)
}

/// Onion-peel fill: each masked pixel takes the mean of its already-known 8-neighbours.
///
/// Every pass only visits the frontier (unknown pixels touching a known one), so
/// the cost follows the highlight area rather than the image size.
fn inpaint(image: &RgbImage, mask: &image::GrayImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();
    let index = |x: u32, y: u32| y as usize * width as usize + x as usize;
    let neighbours = move |x: u32, y: u32| {
        (y.saturating_sub(1)..=(y + 1).min(height - 1)).flat_map(move |ny| {
            (x.saturating_sub(1)..=(x + 1).min(width - 1)).map(move |nx| (nx, ny))
        })
    };

    let mut queued = vec![false; known.len()];
    let mut frontier = Vec::new();
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 && neighbours(x, y).any(|(nx, ny)| known[index(nx, ny)]) {
            queued[index(x, y)] = true;
            frontier.push((x, y));
        }
    }

    while !frontier.is_empty() {
        let filled: Vec<(u32, u32, Rgb<u8>)> = frontier
            .iter()
            .map(|&(x, y)| {
                let mut sum = [0u32; 3];
                let mut count = 0u32;
                for (nx, ny) in neighbours(x, y) {
                    if known[index(nx, ny)] {
                        let p = out.get_pixel(nx, ny);
                        for c in 0..3 {
                            sum[c] += p[c] as u32;
                        }
                        count += 1;
                    }
                }
                (x, y, Rgb(sum.map(|s| ((s + count / 2) / count.max(1)) as u8)))
            })
            .collect();
        for &(x, y, pixel) in &filled {
            out.put_pixel(x, y, pixel);
            known[index(x, y)] = true;
        }

        frontier.clear();
        for &(x, y, _) in &filled {
            for (nx, ny) in neighbours(x, y) {
                let i = index(nx, ny);
                if !known[i] && !queued[i] {
                    queued[i] = true;
                    frontier.push((nx, ny));
                }
            }
        }
    }
    out
}
