//! Guard for destructive filesystem operations.
//!
//! The pipeline repeatedly removes directories and mirrors repositories with
//! `--delete`. Every such operation takes a [`SafePath`], which can only be
//! obtained from [`SafetyGuard::check`]. A path is safe when it resolves to a
//! location strictly below the configured temporary root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::{CompareError, Result};

/// Decides whether a path may be recursively deleted or overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyGuard {
    root: PathBuf,
}

impl SafetyGuard {
    /// Create a guard rooted at `root`, which must be absolute.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            return Err(CompareError::InvalidConfig(format!(
                "temporary root {root:?} must be an absolute path"
            )));
        }
        Ok(Self {
            root: normalize(root),
        })
    }

    /// Guard rooted at the system temporary directory.
    pub fn system_temp() -> Self {
        let tmp = std::env::temp_dir();
        let root = if tmp.is_absolute() {
            tmp
        } else {
            absolutize(&tmp)
        };
        Self {
            root: normalize(&root),
        }
    }

    /// The temporary root everything destructive must live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if `path` lies strictly below the temporary root.
    pub fn is_safe(&self, path: &Path) -> bool {
        let resolved = normalize(&absolutize(path));
        resolved.starts_with(&self.root)
            && resolved.components().count() > self.root.components().count()
    }

    /// Check `path` and return a witness that it may be destroyed.
    pub fn check(&self, path: &Path) -> Result<SafePath> {
        if self.is_safe(path) {
            Ok(SafePath(normalize(&absolutize(path))))
        } else {
            Err(CompareError::PathSafetyViolation {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
        }
    }
}

/// A path that passed [`SafetyGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath(PathBuf);

impl SafePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Recursively remove the directory. A missing directory is not an error.
    pub fn remove_all(&self) -> Result<()> {
        match fs::symlink_metadata(&self.0) {
            Ok(meta) if meta.is_dir() => {
                info!(path = %self.0.display(), "Removing directory");
                fs::remove_dir_all(&self.0)?;
            }
            Ok(_) => fs::remove_file(&self.0)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// `path` made absolute against the working directory, with `.` and `..` folded.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&absolute))
}

/// Fold `.` and `..` lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                if !matches!(out.components().next_back(), Some(Component::RootDir) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SafetyGuard {
        SafetyGuard::new("/tmp").unwrap()
    }

    #[test]
    fn test_resolve_anchors_relative_paths() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolve(Path::new("compare")).unwrap(), cwd.join("compare"));
        assert_eq!(
            resolve(Path::new("/tmp/repo/../compare/./4b5b263")).unwrap(),
            PathBuf::from("/tmp/compare/4b5b263")
        );
    }

    #[test]
    fn test_path_below_root_is_safe() {
        assert!(guard().is_safe(Path::new("/tmp/repo")));
        assert!(guard().is_safe(Path::new("/tmp/compare/4b5b263")));
    }

    #[test]
    fn test_root_itself_is_not_safe() {
        assert!(!guard().is_safe(Path::new("/tmp")));
        assert!(!guard().is_safe(Path::new("/tmp/")));
        assert!(!guard().is_safe(Path::new("/tmp/repo/..")));
    }

    #[test]
    fn test_outside_root_is_not_safe() {
        assert!(!guard().is_safe(Path::new("/etc")));
        assert!(!guard().is_safe(Path::new("/")));
        assert!(!guard().is_safe(Path::new("/home/user/src")));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_not_safe() {
        assert!(!guard().is_safe(Path::new("/tmpfoo/repo")));
    }

    #[test]
    fn test_parent_components_cannot_escape() {
        assert!(!guard().is_safe(Path::new("/tmp/../etc")));
        assert!(!guard().is_safe(Path::new("/tmp/repo/../../home")));
        assert!(guard().is_safe(Path::new("/tmp/a/../b")));
    }

    #[test]
    fn test_relative_root_rejected() {
        assert!(matches!(
            SafetyGuard::new("tmp"),
            Err(CompareError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_check_returns_normalized_witness() {
        let safe = guard().check(Path::new("/tmp/./repo/x/..")).unwrap();
        assert_eq!(safe.as_path(), Path::new("/tmp/repo"));
    }

    #[test]
    fn test_check_rejects_with_violation() {
        match guard().check(Path::new("/etc")) {
            Err(CompareError::PathSafetyViolation { path, root }) => {
                assert_eq!(path, PathBuf::from("/etc"));
                assert_eq!(root, PathBuf::from("/tmp"));
            }
            other => panic!("expected PathSafetyViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_system_temp_accepts_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SafetyGuard::system_temp();
        assert!(guard.is_safe(dir.path()));
        assert!(!guard.is_safe(guard.root()));
    }

    #[test]
    fn test_remove_all_deletes_tree_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("victim");
        fs::create_dir_all(victim.join("nested")).unwrap();
        fs::write(victim.join("nested/file.o"), b"obj").unwrap();

        let safe = SafetyGuard::system_temp().check(&victim).unwrap();
        safe.remove_all().unwrap();
        assert!(!victim.exists());
        safe.remove_all().unwrap();
    }
}
