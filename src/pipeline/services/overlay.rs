//! Visual QA images composited over the original photograph.
use std::path::Path;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::types::detection::Detection;
use crate::pipeline::types::report::Overlays;

pub const ACNE_OVERLAY_FILE: &str = "acne_overlay.png";
pub const PIGMENTATION_OVERLAY_FILE: &str = "pigmentation_overlay.png";
pub const WRINKLES_OVERLAY_FILE: &str = "wrinkles_overlay.png";

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const PIGMENTATION_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const WRINKLE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const WASH_ALPHA: f32 = 0.35;

#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Outline every detection box.
    pub fn draw_boxes(image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut out = image.clone();
        for detection in detections {
            let bbox = detection.bbox;
            for inset in 0..BOX_THICKNESS {
                let width = bbox.width().saturating_sub(2 * inset);
                let height = bbox.height().saturating_sub(2 * inset);
                if width == 0 || height == 0 {
                    break;
                }
                let rect = Rect::at((bbox.x1 + inset) as i32, (bbox.y1 + inset) as i32)
                    .of_size(width, height);
                draw_hollow_rect_mut(&mut out, rect, BOX_COLOR);
            }
        }
        out
    }

    /// Adds `alpha * color` to every masked pixel, saturating at 255.
    pub fn wash(image: &RgbImage, mask: &GrayImage, color: Rgb<u8>, alpha: f32) -> RgbImage {
        let mut out = image.clone();
        for (pixel, flag) in out.pixels_mut().zip(mask.pixels()) {
            if flag[0] == 0 {
                continue;
            }
            for (channel, tint) in pixel.0.iter_mut().zip(color.0) {
                *channel = (*channel as f32 + alpha * tint as f32).round().min(255.0) as u8;
            }
        }
        out
    }

    /// Render and save the three overlays into `dir`.
    pub fn render(
        &self,
        original: &RgbImage,
        detections: &[Detection],
        pigmentation: &GrayImage,
        wrinkles: &GrayImage,
        dir: &Path,
    ) -> Result<Overlays, PipelineError> {
        let acne = save(&Self::draw_boxes(original, detections), dir, ACNE_OVERLAY_FILE)?;
        let pigmentation = save(
            &Self::wash(original, pigmentation, PIGMENTATION_COLOR, WASH_ALPHA),
            dir,
            PIGMENTATION_OVERLAY_FILE,
        )?;
        let wrinkles = save(
            &Self::wash(original, wrinkles, WRINKLE_COLOR, WASH_ALPHA),
            dir,
            WRINKLES_OVERLAY_FILE,
        )?;
        Ok(Overlays {
            acne,
            pigmentation,
            wrinkles,
        })
    }
}

fn save(image: &RgbImage, dir: &Path, file: &str) -> Result<String, PipelineError> {
    let path = dir.join(file);
    let display = path.display().to_string();
    image.save(&path).map_err(|e| PipelineError::Overlay {
        path: display.clone(),
        message: e.to_string(),
    })?;
    debug!("Wrote overlay {}", path.display());
    Ok(display)
}
