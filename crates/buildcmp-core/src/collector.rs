//! Harvest compiled object files into a snapshot that mirrors the build tree.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Relative paths of every object file under `src`, sorted.
///
/// Symlinked directories are not followed, and `skip` (usually the snapshot
/// destination) is never descended into.
pub fn iterate_objects(src: &Path, ext: &str, skip: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(src, src, ext, skip, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(
    root: &Path,
    dir: &Path,
    ext: &str,
    skip: Option<&Path>,
    found: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if skip.is_some_and(|s| s == path.as_path()) {
                continue;
            }
            walk(root, &path, ext, skip, found)?;
        } else if file_type.is_file() && has_extension(&path, ext) {
            if let Ok(rel) = path.strip_prefix(root) {
                found.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.len() > ext.len() && name.ends_with(ext))
}

/// Copy every object file under `src` to the same relative path below `dst`.
///
/// Returns the relative paths that were copied.
pub fn collect_objects(src: &Path, dst: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let objects = iterate_objects(src, ext, Some(dst))?;
    for rel in &objects {
        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src.join(rel), &target)?;
    }
    debug!(count = objects.len(), dst = %dst.display(), "Copied object files");
    Ok(objects)
}
