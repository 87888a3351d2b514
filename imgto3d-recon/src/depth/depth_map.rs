//! Normalized depth map
//!
//! Values live in [0.0, 1.0] where 0 is far/background and 1 is near.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};

/// Ranges at or below this are treated as a flat (degenerate) model output
pub const FLAT_RANGE_EPSILON: f32 = 1e-6;

const U16_MAX: f32 = u16::MAX as f32;

/// Single-channel float raster
pub type DepthBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Summary statistics of a depth map (for diagnostics)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// 2D grid of normalized depth values
#[derive(Debug, Clone)]
pub struct DepthMap {
    buffer: DepthBuffer,
}

impl DepthMap {
    /// Wrap row-major values; `None` if `values.len() != width * height`
    pub fn from_vec(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, values).map(|buffer| Self { buffer })
    }

    /// Min-max normalize raw model output into a depth map
    ///
    /// `(v - min) / (max - min)` over the whole map. When `max - min <= 1e-6`
    /// (or the range is not finite) the result is all zeros.
    pub fn normalized_from_raw(width: u32, height: u32, raw: &[f32]) -> Option<Self> {
        if raw.len() != (width as usize) * (height as usize) {
            return None;
        }
        let mut values = raw.to_vec();
        normalize_min_max(&mut values);
        Self::from_vec(width, height, values)
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.width() == 0 || self.buffer.height() == 0
    }

    /// Depth at pixel (x, y); panics if out of bounds
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.buffer.get_pixel(x, y).0[0]
    }

    /// Row-major values
    pub fn values(&self) -> &[f32] {
        self.buffer.as_raw()
    }

    /// Resample to `width` x `height` with cubic (Catmull-Rom) interpolation
    ///
    /// Resampling runs on a 16-bit quantization of the map; the integer sampler
    /// saturates at the channel bounds, so cubic overshoot cannot leave [0, 1].
    pub fn resize_cubic(&self, width: u32, height: u32) -> DepthMap {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let (w, h) = self.dimensions();
        let quantized: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(w, h, |x, y| {
            Luma([(clamp_unit(self.get(x, y)) * U16_MAX).round() as u16])
        });
        let resized = imageops::resize(&quantized, width, height, FilterType::CatmullRom);
        let buffer = ImageBuffer::from_fn(width, height, |x, y| {
            Luma([resized.get_pixel(x, y).0[0] as f32 / U16_MAX])
        });
        DepthMap { buffer }
    }

    /// 8-bit preview: `round(depth * 255)`
    pub fn to_preview(&self) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let d = clamp_unit(self.get(x, y));
            Luma([(d * 255.0).round() as u8])
        })
    }

    /// Min / max / mean over all pixels
    pub fn stats(&self) -> DepthStats {
        let values = self.values();
        if values.is_empty() {
            return DepthStats {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let (min, max, sum) = values.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v as f64),
        );
        DepthStats {
            min,
            max,
            mean: (sum / values.len() as f64) as f32,
        }
    }
}

/// In-place min-max normalization to [0, 1]
///
/// Flat or non-finite ranges produce all zeros. Non-finite entries map to 0.
pub fn normalize_min_max(values: &mut [f32]) {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    if !range.is_finite() || range <= FLAT_RANGE_EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }

    for v in values.iter_mut() {
        *v = if v.is_finite() {
            clamp_unit((*v - min) / range)
        } else {
            0.0
        };
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
