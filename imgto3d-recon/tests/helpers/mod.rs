//! Test Helper Utilities
//!
//! Shared fakes and fixtures for imgto3d-recon integration tests

#![allow(dead_code)]

pub mod fake_model;
pub mod fake_runner;
pub mod image_generator;
pub mod recording_sink;

// Re-export commonly used items
pub use fake_model::{FakeModelLoader, FakeOutput};
pub use fake_runner::ScriptedStageRunner;
pub use image_generator::{create_image_folder, write_corrupt_image, write_test_image};
pub use recording_sink::RecordingSink;
