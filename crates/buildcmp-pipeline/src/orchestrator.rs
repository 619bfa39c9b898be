//! Whole-run sequencing: validate, stage, then build and analyse each revision.

use std::path::{Path, PathBuf};
use std::time::Instant;

use buildcmp_core::collector::collect_objects;
use buildcmp_core::config::BuildConfig;
use buildcmp_core::disasm::VolatileFilter;
use buildcmp_core::error::Result;
use buildcmp_core::obs::{self, RevisionSpan};
use buildcmp_core::revision::{validate_batch, PatchOverrides, RevisionId};
use buildcmp_core::safety::{resolve, SafetyGuard};
use buildcmp_core::store::{ArtifactStore, Confirm};
use serde::Serialize;
use tracing::{debug, info};

use crate::analyze::DisassemblyAnalyzer;
use crate::builder::{BuildOutcome, CommitBuilder};
use crate::runner::CommandRunner;
use crate::staging::{stage, StagingMode};

/// Everything one comparison run needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Revision ids as given by the operator, not yet validated.
    pub revisions: Vec<String>,
    /// Comma-separated patch overrides, paired positionally with `revisions`.
    pub patches: Option<String>,
    /// Root of the git checkout being compared.
    pub source: PathBuf,
    pub target_dir: PathBuf,
    pub staging: StagingMode,
    pub filter: VolatileFilter,
    pub config: BuildConfig,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub built: Vec<String>,
    pub skipped: Vec<String>,
    /// Commands to compare the first two revisions; empty for a single one.
    pub commands: Vec<String>,
}

/// Drives a run through the staging, build and analysis steps.
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    guard: SafetyGuard,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, guard: SafetyGuard) -> Self {
        Self { runner, guard }
    }

    /// Execute `request`.
    ///
    /// Revision ids, patch pairing and the staging directory are all checked
    /// before the target directory is created or any child process starts.
    /// Revisions are then processed one at a time; the first fatal error
    /// ends the run and leaves finished revisions on disk.
    pub async fn run(&self, request: &RunRequest, confirm: &mut dyn Confirm) -> Result<RunSummary> {
        let start = Instant::now();
        let RunRequest {
            revisions,
            patches,
            source,
            target_dir,
            staging,
            filter,
            config,
        } = request;

        config.validate()?;
        let revisions = validate_batch(revisions)?;
        let patches = match patches {
            Some(list) => PatchOverrides::pair(&revisions, list)?,
            None => PatchOverrides::none(),
        };
        let plan = staging.plan(&self.guard)?;

        // Children run inside the staged tree, so every path handed to them
        // must be absolute.
        let target_dir = resolve(target_dir)?;
        let mut config = config.clone();
        config.patch_dir = resolve(&config.patch_dir)?;
        if !patches.is_empty() {
            debug!(overrides = patches.len(), "Paired patch overrides");
        }
        if let Ok(json) = serde_json::to_string(&config) {
            debug!(config = %json, "Effective configuration");
        }

        obs::emit_run_started(revisions.len(), &target_dir.display().to_string());
        let store = ArtifactStore::open(&target_dir, &self.guard, confirm)?;
        let tree = stage(self.runner, &config.toolchain, &self.guard, source, &plan).await?;

        let builder = CommitBuilder::new(self.runner, &config, &patches, &store, &tree);
        let analyzer = DisassemblyAnalyzer::new(
            self.runner,
            &config.toolchain.objdump,
            filter,
            &config.env,
        );

        let mut summary = RunSummary::default();
        for rev in &revisions {
            let _span = RevisionSpan::enter(rev.as_str());
            let rev_start = Instant::now();
            obs::emit_revision_started(
                rev.as_str(),
                patches.patch_for(rev, &config.default_patch),
            );

            match builder.build(rev).await? {
                BuildOutcome::Skipped(_) => {
                    summary.skipped.push(rev.to_string());
                    continue;
                }
                BuildOutcome::Built(_) => {}
            }

            self.analyze_revision(rev, &store, tree.root(), &config, &analyzer)
                .await?;
            obs::emit_revision_finished(rev.as_str(), rev_start.elapsed().as_millis() as u64);
            summary.built.push(rev.to_string());
        }

        if revisions.len() > 1 {
            summary.commands = store.comparison_commands(&revisions);
            info!("You can use these commands to compare the results:");
            for command in &summary.commands {
                info!("$ {command}");
            }
        }

        obs::emit_run_finished(
            summary.built.len(),
            summary.skipped.len(),
            start.elapsed().as_millis() as u64,
        );
        Ok(summary)
    }

    async fn analyze_revision(
        &self,
        rev: &RevisionId,
        store: &ArtifactStore,
        tree_root: &Path,
        config: &BuildConfig,
        analyzer: &DisassemblyAnalyzer<'_>,
    ) -> Result<()> {
        let objects_dir = store.objects_dir(rev);
        info!("Copying object files to {}", objects_dir.display());
        let objects = collect_objects(tree_root, &objects_dir, &config.toolchain.object_ext)?;

        info!("Performing basic analysis pass");
        let sections = store.sections(rev)?;
        let report = analyzer.analyze(&objects_dir, &objects, &sections).await?;
        store.write_index(rev, &report.fingerprints)?;
        obs::emit_analysis_finished(
            rev.as_str(),
            report.objects,
            report.fingerprints.len(),
            sections.hashes()?.len(),
        );
        Ok(())
    }
}
