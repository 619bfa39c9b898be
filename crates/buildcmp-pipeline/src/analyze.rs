//! Disassembly of collected objects into content-addressed section files.

use std::path::{Path, PathBuf};

use buildcmp_core::config::{Tool, DISASSEMBLE_ARGS};
use buildcmp_core::disasm::{self, VolatileFilter};
use buildcmp_core::error::{CompareError, Result};
use buildcmp_core::fingerprint::SectionStore;
use buildcmp_core::store::SectionFingerprint;
use tracing::debug;

use crate::runner::{CommandRunner, Invocation};

/// Fingerprints produced for one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub objects: usize,
    pub fingerprints: Vec<SectionFingerprint>,
}

/// Runs the disassembler over objects and stores their filtered sections.
pub struct DisassemblyAnalyzer<'a> {
    runner: &'a dyn CommandRunner,
    objdump: &'a Tool,
    filter: &'a VolatileFilter,
    env: &'a [(String, String)],
}

impl<'a> DisassemblyAnalyzer<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        objdump: &'a Tool,
        filter: &'a VolatileFilter,
        env: &'a [(String, String)],
    ) -> Self {
        Self {
            runner,
            objdump,
            filter,
            env,
        }
    }

    /// Analyse `objects` (relative to `objects_dir`) in order.
    pub async fn analyze(
        &self,
        objects_dir: &Path,
        objects: &[PathBuf],
        store: &dyn SectionStore,
    ) -> Result<AnalysisReport> {
        let mut report = AnalysisReport::default();
        for object in objects {
            report
                .fingerprints
                .extend(self.analyze_object(objects_dir, object, store).await?);
            report.objects += 1;
        }
        Ok(report)
    }

    async fn analyze_object(
        &self,
        objects_dir: &Path,
        object: &Path,
        store: &dyn SectionStore,
    ) -> Result<Vec<SectionFingerprint>> {
        let inv = Invocation::tool(self.objdump)
            .args(DISASSEMBLE_ARGS.iter().copied())
            .arg(object.to_string_lossy())
            .current_dir(objects_dir)
            .envs(self.env)
            .capture_stdout();
        let output = self.runner.run(&inv).await?;
        if !output.passed() {
            let stderr = output.stderr.trim();
            return Err(CompareError::AnalysisFailure {
                object: object.to_path_buf(),
                detail: if stderr.is_empty() {
                    format!("exit code {}", output.exit_code)
                } else {
                    stderr.to_string()
                },
            });
        }

        let parsed = disasm::parse(&output.stdout, self.filter);
        if let Some(format) = &parsed.format {
            if !self.filter.supports(format) {
                return Err(CompareError::FilterGap {
                    object: object.to_path_buf(),
                    format: format.clone(),
                    policy: self.filter.name().to_string(),
                });
            }
        }

        let mut fingerprints = Vec::new();
        for section in parsed.persistable() {
            let hash = store.put(&section.text())?;
            fingerprints.push(SectionFingerprint {
                object: object.to_path_buf(),
                section: section.name.clone(),
                hash,
            });
        }
        debug!(
            object = %object.display(),
            sections = fingerprints.len(),
            "Analysed object"
        );
        Ok(fingerprints)
    }
}
