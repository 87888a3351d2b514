//! Source image discovery
//!
//! Lists the images directly inside a folder (no recursion) whose extension is
//! on the allow-list, in file-name order.

use imgto3d_common::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Accepted image extensions (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Image file scanner
#[derive(Debug, Clone, Default)]
pub struct ImageScanner;

impl ImageScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan `root` for images
    ///
    /// Returns an empty list (not an error) when the folder holds no images.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut images = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_image(entry.path()) {
                        images.push(entry.into_path());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!("{} images found in {}", images.len(), root.display());
        Ok(images)
    }
}

/// True if `path` has an accepted image extension
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg", "d.tif"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested").join("e.jpg"), b"x").unwrap();

        let images = ImageScanner::new().scan(temp.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg"]);
    }

    #[test]
    fn test_empty_folder_yields_no_images() {
        let temp = TempDir::new().unwrap();
        assert!(ImageScanner::new().scan(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_folder_is_error() {
        let temp = TempDir::new().unwrap();
        let result = ImageScanner::new().scan(&temp.path().join("nope"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
