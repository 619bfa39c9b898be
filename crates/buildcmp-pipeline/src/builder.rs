//! Per-revision build sequencing.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use buildcmp_core::config::{BuildConfig, STRIP_ARGS};
use buildcmp_core::error::{CompareError, Result};
use buildcmp_core::obs;
use buildcmp_core::revision::{PatchOverrides, RevisionId};
use buildcmp_core::store::ArtifactStore;
use tracing::{error, info, warn};

use crate::runner::{check, CommandRunner, Invocation};
use crate::stage::BuildStage;
use crate::staging::StagedTree;

/// One built executable and its stripped copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltExecutable {
    /// Target path relative to the source tree.
    pub target: String,
    pub copy: PathBuf,
    pub stripped: PathBuf,
}

/// What happened to a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built(Vec<BuiltExecutable>),
    /// Artifacts from an earlier run exist at this directory.
    Skipped(PathBuf),
}

/// Checks out, patches, configures and compiles revisions in a staged tree.
pub struct CommitBuilder<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a BuildConfig,
    patches: &'a PatchOverrides,
    store: &'a ArtifactStore,
    tree: &'a StagedTree,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a BuildConfig,
        patches: &'a PatchOverrides,
        store: &'a ArtifactStore,
        tree: &'a StagedTree,
    ) -> Self {
        Self {
            runner,
            config,
            patches,
            store,
            tree,
        }
    }

    /// Build `rev` unless an earlier run already produced its artifacts.
    pub async fn build(&self, rev: &RevisionId) -> Result<BuildOutcome> {
        match self.store.claim_revision(rev) {
            Ok(_) => {}
            Err(CompareError::PreexistingArtifactDirectory(dir)) => {
                warn!("{} already exists, skipping {rev}", dir.display());
                obs::emit_revision_skipped(rev.as_str(), &dir.display().to_string());
                return Ok(BuildOutcome::Skipped(dir));
            }
            Err(e) => return Err(e),
        }

        let start = Instant::now();
        let mut built = Vec::new();
        let mut stage = Some(BuildStage::FIRST);
        while let Some(current) = stage {
            obs::emit_stage_entered(rev.as_str(), current.name());
            match current {
                BuildStage::Reset => self.git(&["reset", "--hard"]).await?,
                BuildStage::Clean => self.git(&["clean", "-f", "-x", "-d"]).await?,
                BuildStage::Checkout => self.git(&["checkout", rev.as_str()]).await?,
                BuildStage::Patch => self.apply_patch(rev).await?,
                BuildStage::Configure => self.configure().await?,
                BuildStage::Compile => built = self.compile(rev).await?,
                BuildStage::Done => {
                    info!(
                        revision = %rev,
                        executables = built.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Build finished"
                    );
                }
            }
            stage = current.next();
        }
        Ok(BuildOutcome::Built(built))
    }

    fn in_tree(&self, invocation: Invocation) -> Invocation {
        invocation
            .current_dir(self.tree.root())
            .envs(&self.config.env)
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        let inv = self.in_tree(Invocation::tool(&self.config.toolchain.git).args(args.iter().copied()));
        check(self.runner, &inv).await?;
        Ok(())
    }

    async fn apply_patch(&self, rev: &RevisionId) -> Result<()> {
        let name = self.patches.patch_for(rev, &self.config.default_patch);
        let patch = self.config.patch_dir.join(name);
        let inv = self.in_tree(
            Invocation::tool(&self.config.toolchain.git)
                .arg("apply")
                .arg(patch.to_string_lossy()),
        );
        let output = self.runner.run(&inv).await?;
        if !output.passed() {
            let command = inv.command_line();
            error!("Command failed: {command}");
            error!(
                "Could not apply patch to strip build info. Probably it needs to be updated for {rev}"
            );
            return Err(CompareError::PatchApplyFailure { patch, command });
        }
        Ok(())
    }

    async fn configure(&self) -> Result<()> {
        let root = self.tree.root();
        let autogen = root.join("autogen.sh");
        check(self.runner, &self.in_tree(Invocation::new(autogen.to_string_lossy()))).await?;

        let configure = root.join("configure");
        let inv = self.in_tree(
            Invocation::new(configure.to_string_lossy()).args(self.config.configure_args()),
        );
        check(self.runner, &inv).await?;
        Ok(())
    }

    async fn compile(&self, rev: &RevisionId) -> Result<Vec<BuiltExecutable>> {
        let toolchain = &self.config.toolchain;
        let mut built = Vec::with_capacity(self.config.executables.len());
        for target in &self.config.executables {
            let make = Invocation::tool(&toolchain.make)
                .arg(format!("-j{}", self.config.parallelism))
                .arg(target.as_str());
            check(self.runner, &self.in_tree(make)).await?;

            let copy = self.store.executable_path(target, rev);
            info!("Copying {target} to {}", copy.display());
            fs::copy(self.tree.root().join(target), &copy)?;

            let stripped = self.store.stripped_path(target, rev);
            let objcopy = Invocation::tool(&toolchain.objcopy)
                .args(STRIP_ARGS.iter().copied())
                .arg(target.as_str())
                .arg(stripped.to_string_lossy());
            check(self.runner, &self.in_tree(objcopy)).await?;

            built.push(BuiltExecutable {
                target: target.clone(),
                copy,
                stripped,
            });
        }
        Ok(built)
    }
}
