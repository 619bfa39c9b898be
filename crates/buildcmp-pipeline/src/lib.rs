//! buildcmp pipeline
//!
//! Drives the external toolchain for a comparison run:
//! - Stages the repository (mirror or in-place)
//! - Checks out, patches, configures and compiles each revision
//! - Disassembles collected objects into content-addressed section files

pub mod analyze;
pub mod builder;
pub mod fakes;
pub mod orchestrator;
pub mod runner;
pub mod stage;
pub mod staging;

// Re-export key types
pub use analyze::{AnalysisReport, DisassemblyAnalyzer};
pub use builder::{BuildOutcome, BuiltExecutable, CommitBuilder};
pub use orchestrator::{Orchestrator, RunRequest, RunSummary};
pub use runner::{check, CommandRunner, Invocation, InvocationOutput, SystemRunner};
pub use stage::BuildStage;
pub use staging::{stage, StagedTree, StagingMode, StagingPlan};
