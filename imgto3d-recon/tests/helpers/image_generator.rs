//! Synthetic image fixtures

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Write a gradient image; format follows the extension
pub fn write_test_image(path: &Path, width: u32, height: u32) -> PathBuf {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    img.save(path).unwrap();
    path.to_path_buf()
}

/// Write bytes that no decoder accepts under an image extension
pub fn write_corrupt_image(path: &Path) -> PathBuf {
    std::fs::write(path, b"definitely not an image").unwrap();
    path.to_path_buf()
}

/// Create `<parent>/<name>` holding `count` small PNGs named img_00.png, img_01.png, ...
pub fn create_image_folder(parent: &Path, name: &str, count: usize) -> PathBuf {
    let dir = parent.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        write_test_image(&dir.join(format!("img_{:02}.png", i)), 24, 16);
    }
    dir
}
