//! Workspace layout and artifact writers
//!
//! AI backend layout: `<source>_ai_workspace/{<stem>_depth.png, <stem>.ply}`.
//! Pipeline backend layout: `<output>/{database.db, sparse/0/*, dense/*, model.ply}`.

use crate::depth::DepthMap;
use crate::projection::Point3D;
use image::ImageError;
use imgto3d_common::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Suffix of the AI backend workspace next to the source folder
pub const AI_WORKSPACE_SUFFIX: &str = "_ai_workspace";

/// Suffix of the default pipeline workspace next to the source folder
pub const PIPELINE_WORKSPACE_SUFFIX: &str = "_workspace";

/// Per-job output directory
#[derive(Debug, Clone)]
pub struct WorkspaceWriter {
    root: PathBuf,
}

impl WorkspaceWriter {
    /// Create (or reuse) the workspace directory at `root`
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| Error::WorkspaceCreateFailed {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<stem>_depth.png`
    pub fn depth_preview_path(&self, image: &Path) -> PathBuf {
        self.root.join(format!("{}_depth.png", file_stem(image)))
    }

    /// `<root>/<stem>.ply`
    pub fn point_cloud_path(&self, image: &Path) -> PathBuf {
        self.root.join(format!("{}.ply", file_stem(image)))
    }

    /// Write the 8-bit preview of `depth`; the format follows the file extension
    pub fn save_depth_preview(path: &Path, depth: &DepthMap) -> Result<()> {
        depth.to_preview().save(path).map_err(|e| match e {
            ImageError::IoError(io) => Error::Io(io),
            other => Error::Encode(format!("{}: {}", path.display(), other)),
        })?;
        debug!(path = %path.display(), "Depth preview written");
        Ok(())
    }

    /// Write an ASCII PLY with one vertex per point
    pub fn save_point_cloud_ply(path: &Path, points: &[Point3D]) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);

        writeln!(out, "ply")?;
        writeln!(out, "format ascii 1.0")?;
        writeln!(out, "element vertex {}", points.len())?;
        writeln!(out, "property float x")?;
        writeln!(out, "property float y")?;
        writeln!(out, "property float z")?;
        writeln!(out, "property uchar red")?;
        writeln!(out, "property uchar green")?;
        writeln!(out, "property uchar blue")?;
        writeln!(out, "end_header")?;
        for p in points {
            writeln!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, p.r, p.g, p.b)?;
        }
        out.flush()?;

        debug!(path = %path.display(), points = points.len(), "Point cloud written");
        Ok(())
    }
}

/// Read back an ASCII PLY written by [`WorkspaceWriter::save_point_cloud_ply`]
pub fn read_point_cloud_ply(path: &Path) -> Result<Vec<Point3D>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    let malformed = |what: &str| Error::InvalidInput(format!("{}: {}", path.display(), what));

    match lines.next().transpose()? {
        Some(l) if l.trim() == "ply" => {}
        _ => return Err(malformed("missing ply magic")),
    }

    let mut vertex_count: Option<usize> = None;
    loop {
        let line = lines
            .next()
            .transpose()?
            .ok_or_else(|| malformed("header not terminated"))?;
        let line = line.trim();
        if line == "end_header" {
            break;
        }
        if let Some(rest) = line.strip_prefix("format ") {
            if !rest.starts_with("ascii") {
                return Err(malformed("only ascii PLY is supported"));
            }
        } else if let Some(n) = line.strip_prefix("element vertex ") {
            vertex_count = Some(n.trim().parse().map_err(|_| malformed("bad vertex count"))?);
        }
    }

    let count = vertex_count.ok_or_else(|| malformed("no vertex element"))?;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let line = lines
            .next()
            .transpose()?
            .ok_or_else(|| malformed("fewer vertices than declared"))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(malformed("vertex line must have 6 fields"));
        }
        let float = |s: &str| s.parse::<f32>().map_err(|_| malformed("bad coordinate"));
        let byte = |s: &str| s.parse::<u8>().map_err(|_| malformed("bad color"));
        points.push(Point3D {
            x: float(fields[0])?,
            y: float(fields[1])?,
            z: float(fields[2])?,
            r: byte(fields[3])?,
            g: byte(fields[4])?,
            b: byte(fields[5])?,
        });
    }
    Ok(points)
}

/// Sibling `<name>_ai_workspace` of the images folder
pub fn ai_workspace_for(images: &Path) -> Result<PathBuf> {
    sibling_with_suffix(images, AI_WORKSPACE_SUFFIX)
}

/// Sibling `<name>_workspace` of the images folder
pub fn default_pipeline_workspace(images: &Path) -> Result<PathBuf> {
    sibling_with_suffix(images, PIPELINE_WORKSPACE_SUFFIX)
}

/// Fail with `WorkspaceEqualsSource` if the two directories are the same or
/// either contains the other
pub fn ensure_workspace_separate(source_dir: &Path, workspace: &Path) -> Result<()> {
    let source = resolve(source_dir)?;
    let ws = resolve(workspace)?;
    if ws.starts_with(&source) || source.starts_with(&ws) {
        return Err(Error::WorkspaceEqualsSource {
            source_dir: source,
            workspace: ws,
        });
    }
    Ok(())
}

fn sibling_with_suffix(images: &Path, suffix: &str) -> Result<PathBuf> {
    let images = resolve(images)?;
    let name = images
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("{} has no folder name", images.display())))?;
    let parent = images.parent().unwrap_or_else(|| Path::new("/"));
    Ok(parent.join(format!("{}{}", name.to_string_lossy(), suffix)))
}

/// Absolute path with symlinks resolved where the path exists and `.`/`..`
/// folded lexically where it does not
fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Canonicalize the deepest existing ancestor so both sides compare alike
    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }

    let mut normalized = PathBuf::new();
    for component in resolved.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
