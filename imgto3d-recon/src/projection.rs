//! Depth map back-projection
//!
//! Turns a normalized depth map plus its source color image into a colored
//! point set using an inverse pinhole camera.
//!
//! This is a visualization policy, not metric reconstruction: the depth map
//! only encodes relative closeness, so the absolute scale of the output is
//! arbitrary. Only relative proportions within one cloud are meaningful.
//!
//! Per sampled pixel with normalized depth `d`:
//! - skip when `d < background_threshold`
//! - `Z = min(depth_scale / (d + depth_bias), z_clamp)`
//! - `X = (px - width/2) * Z / focal_length`
//! - `Y = (py - height/2) * Z / focal_length`

use crate::depth::DepthMap;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Back-projection constants
///
/// Hand-tuned defaults; treat them as configuration, not physical constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Pinhole focal length in pixels
    pub focal_length: f32,
    /// Multiplier turning inverse depth into pseudo-range
    pub depth_scale: f32,
    /// Added to depth before inversion (avoids division by zero)
    pub depth_bias: f32,
    /// Upper bound on Z
    pub z_clamp: f32,
    /// Normalized depth below this is background and never projected
    pub background_threshold: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            focal_length: 1000.0,
            depth_scale: 2000.0,
            depth_bias: 0.01,
            z_clamp: 5000.0,
            background_threshold: 0.1,
        }
    }
}

/// One colored point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Points of one image, in raster scan order
pub type PointCloud = Vec<Point3D>;

/// Depth map to point cloud projector
#[derive(Debug, Clone)]
pub struct PointCloudProjector {
    params: CameraParams,
    stride: u32,
}

impl PointCloudProjector {
    /// Create projector; a stride of 0 is treated as 1
    pub fn new(params: CameraParams, stride: u32) -> Self {
        Self {
            params,
            stride: stride.max(1),
        }
    }

    pub fn params(&self) -> &CameraParams {
        &self.params
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Project every `stride`-th pixel of `depth`, coloring from `color`
    ///
    /// Returns an empty cloud (not an error) if every sampled pixel is background.
    pub fn project(&self, depth: &DepthMap, color: &RgbImage) -> PointCloud {
        self.project_inner(depth, color, || false)
            .unwrap_or_default()
    }

    /// Same as [`project`](Self::project), polling `cancel` once per sampled row
    ///
    /// Returns `None` if cancellation was observed.
    pub fn project_cancellable(
        &self,
        depth: &DepthMap,
        color: &RgbImage,
        cancel: &CancellationToken,
    ) -> Option<PointCloud> {
        self.project_inner(depth, color, || cancel.is_cancelled())
    }

    /// Upper bound on the number of points one depth map can produce
    pub fn max_points(&self, width: u32, height: u32) -> usize {
        let cols = width.div_ceil(self.stride) as usize;
        let rows = height.div_ceil(self.stride) as usize;
        cols * rows
    }

    fn project_inner(
        &self,
        depth: &DepthMap,
        color: &RgbImage,
        is_cancelled: impl Fn() -> bool,
    ) -> Option<PointCloud> {
        let (width, height) = depth.dimensions();
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let p = &self.params;

        let mut points = Vec::with_capacity(self.max_points(width, height) / 2);

        for y in (0..height).step_by(self.stride as usize) {
            if is_cancelled() {
                return None;
            }
            for x in (0..width).step_by(self.stride as usize) {
                let d = depth.get(x, y);
                if d.is_nan() || d < p.background_threshold {
                    continue;
                }

                // d is relative inverse depth (1 = near); bias keeps the division finite
                let z = (p.depth_scale / (d + p.depth_bias)).min(p.z_clamp);
                let px = (x as f32 - center_x) * z / p.focal_length;
                let py = (y as f32 - center_y) * z / p.focal_length;

                let [r, g, b] = if x < color.width() && y < color.height() {
                    color.get_pixel(x, y).0
                } else {
                    [0, 0, 0]
                };

                points.push(Point3D {
                    x: px,
                    y: py,
                    z,
                    r,
                    g,
                    b,
                });
            }
        }

        Some(points)
    }
}

impl Default for PointCloudProjector {
    fn default() -> Self {
        Self::new(CameraParams::default(), crate::config::DEFAULT_SUBSAMPLE_STRIDE)
    }
}
