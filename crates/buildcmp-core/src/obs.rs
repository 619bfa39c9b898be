//! Structured lifecycle events for a comparison run.
//!
//! Every event carries an `event` field so JSON log consumers can filter on
//! it; see [`crate::telemetry::init_tracing`] for output setup.

use tracing::info;

/// RAII guard that tags every log line with the revision being processed.
///
/// ```ignore
/// let _span = RevisionSpan::enter("4b5b263");
/// ```
pub struct RevisionSpan {
    _span: tracing::span::EnteredSpan,
}

impl RevisionSpan {
    pub fn enter(revision: &str) -> Self {
        let span = tracing::info_span!("buildcmp.revision", revision = %revision);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(revisions: usize, target: &str) {
    info!(event = "run.started", revisions = revisions, target = %target);
}

/// Emit event: run finished.
pub fn emit_run_finished(built: usize, skipped: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        built = built,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

pub fn emit_revision_started(revision: &str, patch: &str) {
    info!(event = "revision.started", revision = %revision, patch = %patch);
}

/// Emit event: revision skipped because its artifacts already exist.
pub fn emit_revision_skipped(revision: &str, dir: &str) {
    info!(event = "revision.skipped", revision = %revision, dir = %dir);
}

pub fn emit_revision_finished(revision: &str, duration_ms: u64) {
    info!(event = "revision.finished", revision = %revision, duration_ms = duration_ms);
}

/// Emit event: a build stage began.
pub fn emit_stage_entered(revision: &str, stage: &str) {
    info!(event = "stage.entered", revision = %revision, stage = %stage);
}

/// Emit event: disassembly analysis of a revision completed.
pub fn emit_analysis_finished(revision: &str, objects: usize, sections: usize, unique: usize) {
    info!(
        event = "analysis.finished",
        revision = %revision,
        objects = objects,
        sections = sections,
        unique = unique,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_span_create() {
        let _span = RevisionSpan::enter("4b5b263");
        emit_stage_entered("4b5b263", "checkout");
    }
}
