//! Working-copy preparation.
//!
//! Builds run either directly in the source checkout or in a mirror of its
//! `.git` directory below the temporary root. Either way the result is a
//! [`StagedTree`] whose root is handed to every later child process as its
//! working directory.

use std::fs;
use std::path::{Path, PathBuf};

use buildcmp_core::config::Toolchain;
use buildcmp_core::error::{CompareError, Result};
use buildcmp_core::safety::{SafePath, SafetyGuard};
use tracing::{info, warn};

use crate::runner::{check, CommandRunner, Invocation};

/// How the source tree is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingMode {
    /// Build in the source checkout itself.
    InPlace,
    /// Mirror the repository into `dir` and build there.
    Mirror { dir: PathBuf },
}

/// A staging mode whose destructive target has passed the guard.
#[derive(Debug, Clone)]
pub enum StagingPlan {
    InPlace,
    Mirror(SafePath),
}

impl StagingMode {
    /// Check the mirror directory before anything on disk is touched.
    pub fn plan(&self, guard: &SafetyGuard) -> Result<StagingPlan> {
        match self {
            StagingMode::InPlace => Ok(StagingPlan::InPlace),
            StagingMode::Mirror { dir } => Ok(StagingPlan::Mirror(guard.check(dir)?)),
        }
    }
}

/// The tree revisions are checked out and built in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTree {
    root: PathBuf,
}

impl StagedTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Prepare the working copy described by `plan` from the checkout at `source`.
pub async fn stage(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    guard: &SafetyGuard,
    source: &Path,
    plan: &StagingPlan,
) -> Result<StagedTree> {
    let git_dir = source.join(".git");
    if !git_dir.is_dir() {
        return Err(CompareError::InvalidConfig(format!(
            "{} is not the root of a git checkout",
            source.display()
        )));
    }

    match plan {
        StagingPlan::InPlace => {
            warn!(
                "Building in-place: all untracked files in {} will be removed repeatedly",
                source.display()
            );
            Ok(StagedTree::new(source))
        }
        StagingPlan::Mirror(dir) => {
            if runner.has_program(&toolchain.rsync.program) {
                mirror_with_rsync(runner, toolchain, &git_dir, dir).await?;
            } else {
                warn!("rsync not found, copying .git with a full recursive copy");
                fs::create_dir_all(dir)?;
                let stale = guard.check(&dir.as_path().join(".git"))?;
                stale.remove_all()?;
                copy_tree(&git_dir, stale.as_path())?;
            }
            info!(dir = %dir.as_path().display(), "Staged repository");
            Ok(StagedTree::new(dir.as_path()))
        }
    }
}

async fn mirror_with_rsync(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    git_dir: &Path,
    dir: &SafePath,
) -> Result<()> {
    info!("Mirroring {} to {}", git_dir.display(), dir.as_path().display());
    let inv = Invocation::tool(&toolchain.rsync)
        .args(["-r", "--delete"])
        .arg(git_dir.to_string_lossy())
        .arg(dir.as_path().to_string_lossy());
    check(runner, &inv).await?;
    Ok(())
}

/// Recursively copy `src` to `dst`, recreating symlinks rather than following them.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)?;
    Ok(())
}
