//! Binary mask helpers: morphology, Otsu and connected components.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::pipeline::types::detection::BoundingBox;
use crate::pipeline::types::region::MASK_ON;

pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// 3x3 structuring elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structuring {
    /// Full 3x3 square.
    Square,
    /// 3x3 cross, the discrete 3x3 ellipse.
    Cross,
}

impl Structuring {
    fn norm(self) -> Norm {
        match self {
            Structuring::Square => Norm::LInf,
            Structuring::Cross => Norm::L1,
        }
    }
}

pub fn from_predicate(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if f(x, y) {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    })
}

pub fn open(mask: &GrayImage, element: Structuring) -> GrayImage {
    morphology::open(mask, element.norm(), 1)
}

pub fn close(mask: &GrayImage, element: Structuring) -> GrayImage {
    morphology::close(mask, element.norm(), 1)
}

/// Opening followed by closing.
pub fn open_close(mask: &GrayImage, element: Structuring) -> GrayImage {
    close(&open(mask, element), element)
}

pub fn count_set(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&v| v > 0).count() as u64
}

pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let raw = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| if x > 0 && y > 0 { MASK_ON } else { 0 })
        .collect();
    GrayImage::from_raw(a.width(), a.height(), raw)
        .unwrap_or_else(|| GrayImage::new(a.width(), a.height()))
}

pub fn union_into(target: &mut GrayImage, other: &GrayImage) {
    for (out, value) in target.pixels_mut().zip(other.pixels()) {
        if value[0] > 0 {
            out[0] = MASK_ON;
        }
    }
}

/// Otsu level computed from the given samples only.
pub fn otsu_of(values: &[u8]) -> u8 {
    if values.is_empty() {
        return 0;
    }
    match GrayImage::from_raw(values.len() as u32, 1, values.to_vec()) {
        Some(samples) => otsu_level(&samples),
        None => 0,
    }
}

/// Geometry of one 8-connected component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub label: u32,
    pub area: u32,
    /// Count of pixel edges facing background or the image border.
    pub perimeter: u32,
    pub centroid: (f32, f32),
    pub bbox: BoundingBox,
}

impl Component {
    /// `4 pi area / perimeter^2`.
    pub fn circularity(&self) -> f32 {
        let perimeter = self.perimeter as f32;
        4.0 * std::f32::consts::PI * self.area as f32 / (perimeter * perimeter + 1e-8)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.bbox.width() as f32 / (self.bbox.height() as f32 + 1e-8)
    }

    pub fn rounded_centroid(&self) -> (u32, u32) {
        (self.centroid.0.round() as u32, self.centroid.1.round() as u32)
    }
}

/// Labelled components of a binary mask, ordered by label.
#[derive(Debug, Clone)]
pub struct Components {
    pub labels: LabelImage,
    pub components: Vec<Component>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

pub fn label_components(mask: &GrayImage) -> Components {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let (width, height) = labels.dimensions();
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;

    struct Accumulator {
        area: u32,
        perimeter: u32,
        sum_x: f64,
        sum_y: f64,
        min_x: u32,
        min_y: u32,
        max_x: u32,
        max_y: u32,
    }

    let mut acc: Vec<Accumulator> = (0..max_label)
        .map(|_| Accumulator {
            area: 0,
            perimeter: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        })
        .collect();

    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let entry = &mut acc[label as usize - 1];
        entry.area += 1;
        entry.sum_x += x as f64;
        entry.sum_y += y as f64;
        entry.min_x = entry.min_x.min(x);
        entry.min_y = entry.min_y.min(y);
        entry.max_x = entry.max_x.max(x);
        entry.max_y = entry.max_y.max(y);

        let neighbours = [
            (x.checked_sub(1), Some(y)),
            (x.checked_add(1).filter(|&nx| nx < width), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), y.checked_add(1).filter(|&ny| ny < height)),
        ];
        for neighbour in neighbours {
            match neighbour {
                (Some(nx), Some(ny)) if labels.get_pixel(nx, ny)[0] == label => {}
                _ => entry.perimeter += 1,
            }
        }
    }

    let components = acc
        .into_iter()
        .enumerate()
        .filter(|(_, a)| a.area > 0)
        .map(|(index, a)| Component {
            label: index as u32 + 1,
            area: a.area,
            perimeter: a.perimeter,
            centroid: (
                (a.sum_x / a.area as f64) as f32,
                (a.sum_y / a.area as f64) as f32,
            ),
            bbox: BoundingBox {
                x1: a.min_x,
                y1: a.min_y,
                x2: a.max_x + 1,
                y2: a.max_y + 1,
            },
        })
        .collect();

    Components { labels, components }
}
