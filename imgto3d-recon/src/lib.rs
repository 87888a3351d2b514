//! imgto3d-recon library interface
//!
//! Photos-to-3D reconstruction with two backends:
//! - AI: monocular depth per image, back-projected into colored point clouds
//! - external pipeline: structure-from-motion / multi-view stereo tool stages

pub mod config;
pub mod depth;
pub mod projection;
pub mod services;
pub mod workspace;

pub use crate::config::ReconConfig;
pub use crate::projection::{CameraParams, Point3D, PointCloud, PointCloudProjector};
pub use crate::services::{JobHandle, ReconService};
