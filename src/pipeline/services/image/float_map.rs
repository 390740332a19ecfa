use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::{gaussian_blur_f32, Kernel as FilterKernel};

use crate::pipeline::types::region::PixelRect;

/// Single-channel `f32` image used for filter responses and statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FloatMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// ITU-R BT.601 luma in `[0, 255]`.
    pub fn luminance(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image
                .pixels()
                .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
                .collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn zip_map(&self, other: &FloatMap, f: impl Fn(f32, f32) -> f32) -> Self {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Zero every pixel where `mask` is unset.
    pub fn masked(&self, mask: &GrayImage) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(mask.as_raw())
                .map(|(&v, &m)| if m > 0 { v } else { 0.0 })
                .collect(),
        }
    }

    /// Values at pixels where `mask` is set.
    pub fn values_where(&self, mask: &GrayImage) -> Vec<f32> {
        self.data
            .iter()
            .zip(mask.as_raw())
            .filter(|(_, &m)| m > 0)
            .map(|(&v, _)| v)
            .collect()
    }

    pub fn min_max(&self) -> (f32, f32) {
        min_max(&self.data)
    }

    pub fn min_max_within(&self, rect: PixelRect) -> (f32, f32) {
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let v = self.get(x, y);
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if lo > hi {
            (0.0, 0.0)
        } else {
            (lo, hi)
        }
    }

    /// `(v - min) / (max - min + 1e-6)` over the whole map.
    pub fn normalized(&self) -> Self {
        let (lo, hi) = self.min_max();
        self.map(|v| (v - lo) / (hi - lo + NORMALIZE_EPSILON))
    }

    /// Min-max normalization using the range found inside `rect`; pixels outside are zeroed.
    pub fn normalized_within(&self, rect: PixelRect) -> Self {
        let (lo, hi) = self.min_max_within(rect);
        Self::from_fn(self.width, self.height, |x, y| {
            if rect.contains_point(x, y) {
                (self.get(x, y) - lo) / (hi - lo + NORMALIZE_EPSILON)
            } else {
                0.0
            }
        })
    }

    /// Saturating conversion to 8 bits, truncating like an integer cast.
    pub fn to_gray_image(&self) -> GrayImage {
        let raw = self.data.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect();
        GrayImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    pub fn gaussian_blur(&self, sigma: f32) -> Self {
        if sigma <= 0.0 || self.data.is_empty() {
            return self.clone();
        }
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            match ImageBuffer::from_raw(self.width, self.height, self.data.clone()) {
                Some(buffer) => buffer,
                None => return self.clone(),
            };
        let blurred = gaussian_blur_f32(&buffer, sigma);
        Self {
            width: self.width,
            height: self.height,
            data: blurred.into_raw(),
        }
    }

    /// Cross-correlation, edge pixels replicated past the border.
    pub fn correlate(&self, kernel: &Kernel) -> Self {
        if self.data.is_empty() {
            return self.clone();
        }
        Self::from_buffer(&correlate_buffer(&self.to_buffer(), kernel))
    }

    /// Cross-correlation evaluated only inside `rect`; other outputs are zero.
    ///
    /// The filter runs on a crop of `rect` grown by the kernel radius, so
    /// outputs inside `rect` match [`FloatMap::correlate`].
    pub fn correlate_within(&self, kernel: &Kernel, rect: PixelRect) -> Self {
        let mut out = Self::new(self.width, self.height);
        if self.data.is_empty() || rect.is_empty() {
            return out;
        }
        let rx = (kernel.width / 2) as u32;
        let ry = (kernel.height / 2) as u32;
        let left = rect.x.saturating_sub(rx);
        let top = rect.y.saturating_sub(ry);
        let right = (rect.right() + rx).min(self.width);
        let bottom = (rect.bottom() + ry).min(self.height);

        let crop: FloatBuffer = ImageBuffer::from_fn(right - left, bottom - top, |x, y| {
            Luma([self.get(left + x, top + y)])
        });
        let response = correlate_buffer(&crop, kernel);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                out.set(x, y, response.get_pixel(x - left, y - top)[0]);
            }
        }
        out
    }

    /// Mean over a `size` x `size` window, as a row pass then a column pass.
    pub fn box_mean(&self, size: usize) -> Self {
        let size = size.max(1) | 1;
        let row = Kernel::new(size, 1, vec![1.0 / size as f32; size]);
        let column = Kernel::new(1, size, vec![1.0 / size as f32; size]);
        self.correlate(&row).correlate(&column)
    }

    /// `E[x^2] - E[x]^2` over a `size` x `size` window.
    pub fn local_variance(&self, size: usize) -> Self {
        // Centering keeps flat areas at exactly zero variance.
        let offset = mean(&self.data);
        let centered = self.map(|v| v - offset);
        let mean = centered.box_mean(size);
        let mean_sq = centered.map(|v| v * v).box_mean(size);
        mean_sq.zip_map(&mean, |sq, m| (sq - m * m).max(0.0))
    }

    /// Standard deviation over a `size` x `size` window.
    pub fn local_std(&self, size: usize) -> Self {
        self.local_variance(size).map(f32::sqrt)
    }

    fn to_buffer(&self) -> FloatBuffer {
        ImageBuffer::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]))
    }

    fn from_buffer(buffer: &FloatBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            data: buffer.as_raw().clone(),
        }
    }
}

pub const NORMALIZE_EPSILON: f32 = 1e-6;

type FloatBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

fn correlate_buffer(buffer: &FloatBuffer, kernel: &Kernel) -> FloatBuffer {
    let kernel = FilterKernel::new(&kernel.data, kernel.width as u32, kernel.height as u32);
    kernel.filter::<_, _, Luma<f32>>(buffer, |out: &mut f32, v: f32| *out = v)
}

/// Odd-sized correlation kernel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Kernel {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(width * height, data.len());
        Self {
            width,
            height,
            data,
        }
    }

    pub fn square3(rows: [[f32; 3]; 3]) -> Self {
        Self::new(3, 3, rows.iter().flatten().copied().collect())
    }

    /// Real Gabor kernel `exp(-(x'^2 + gamma^2 y'^2) / 2 sigma^2) * cos(2 pi x' / lambda + psi)`.
    pub fn gabor(size: usize, sigma: f32, theta: f32, lambda: f32, gamma: f32, psi: f32) -> Self {
        let size = size | 1;
        let half = (size / 2) as i32;
        let (sin_t, cos_t) = theta.sin_cos();
        let ex = -0.5 / (sigma * sigma);
        let ey = -0.5 * gamma * gamma / (sigma * sigma);
        let mut data = Vec::with_capacity(size * size);
        for y in -half..=half {
            for x in -half..=half {
                let (x, y) = (x as f32, y as f32);
                let xr = x * cos_t + y * sin_t;
                let yr = -x * sin_t + y * cos_t;
                let envelope = (ex * xr * xr + ey * yr * yr).exp();
                data.push(envelope * (2.0 * std::f32::consts::PI * xr / lambda + psi).cos());
            }
        }
        Self::new(size, size, data)
    }

    pub fn laplacian() -> Self {
        Self::square3([[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]])
    }

    /// Laplacian with the wider 3x3 aperture.
    pub fn laplacian_wide() -> Self {
        Self::square3([[2.0, 0.0, 2.0], [0.0, -8.0, 0.0], [2.0, 0.0, 2.0]])
    }

    pub fn sobel_x() -> Self {
        Self::square3([[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]])
    }

    pub fn sobel_y() -> Self {
        Self::square3([[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]])
    }

    pub fn sobel_xx() -> Self {
        Self::square3([[1.0, -2.0, 1.0], [2.0, -4.0, 2.0], [1.0, -2.0, 1.0]])
    }

    pub fn sobel_yy() -> Self {
        Self::square3([[1.0, 2.0, 1.0], [-2.0, -4.0, -2.0], [1.0, 2.0, 1.0]])
    }

    pub fn sobel_xy() -> Self {
        Self::square3([[1.0, 0.0, -1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 1.0]])
    }

    pub fn size(&self) -> usize {
        self.width.max(self.height)
    }
}

pub fn min_max(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32
}

/// Population standard deviation.
pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values) as f64;
    let var = values
        .iter()
        .map(|&v| (v as f64 - m).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    var.sqrt() as f32
}

/// Percentile with linear interpolation between closest ranks; 0 for no values.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Median of one channel, averaging the middle pair for even counts.
pub fn median(values: &[f32]) -> f32 {
    percentile(values, 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&values), 2.5);
        assert!((std_dev(&values) - 1.118_034).abs() < 1e-5);
        assert_eq!(percentile(&values, 50.0), 2.5);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert_eq!(percentile(&[], 90.0), 0.0);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
    }

    #[test]
    fn test_correlate_constant_map_is_flat() {
        let map = FloatMap::filled(12, 9, 7.0);
        let lap = map.correlate(&Kernel::laplacian());
        assert!(lap.data().iter().all(|v| v.abs() < 1e-5));

        let mean = map.box_mean(5);
        assert!(mean.data().iter().all(|v| (v - 7.0).abs() < 1e-4));
        assert!(map.local_std(9).data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_laplacian_responds_to_point() {
        let mut map = FloatMap::new(5, 5);
        map.set(2, 2, 1.0);
        let lap = map.correlate(&Kernel::laplacian());
        assert_eq!(lap.get(2, 2), -4.0);
        assert_eq!(lap.get(1, 2), 1.0);
        assert_eq!(lap.get(0, 0), 0.0);
    }

    #[test]
    fn test_correlate_within_leaves_outside_zero() {
        let map = FloatMap::filled(10, 10, 1.0);
        let rect = PixelRect::new(2, 2, 3, 3);
        let out = map.correlate_within(&Kernel::gabor(7, 2.0, 0.0, 10.0, 0.5, 0.0), rect);
        assert_eq!(out.get(0, 0), 0.0);
        assert!(out.get(3, 3) != 0.0);
    }

    #[test]
    fn test_normalized_range() {
        let map = FloatMap::from_fn(4, 1, |x, _| x as f32 * 10.0);
        let n = map.normalized();
        assert!(n.get(0, 0).abs() < 1e-6);
        assert!((n.get(3, 0) - 1.0).abs() < 1e-4);
        assert!(FloatMap::filled(3, 3, 5.0).normalized().data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_correlate_within_matches_full_filter_inside_rect() {
        let map = FloatMap::from_fn(16, 12, |x, y| ((x * 7 + y * 13) % 11) as f32);
        let kernel = Kernel::gabor(5, 1.5, 0.7, 4.0, 0.5, 0.0);
        let full = map.correlate(&kernel);
        let rect = PixelRect::new(0, 3, 9, 6);
        let within = map.correlate_within(&kernel, rect);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                assert!((full.get(x, y) - within.get(x, y)).abs() < 1e-4);
            }
        }
    }
}
