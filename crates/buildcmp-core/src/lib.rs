//! buildcmp core library
//!
//! Path safety, revision validation, object harvesting, disassembly
//! fingerprinting and the on-disk artifact layout. Everything here is free of
//! subprocesses; `buildcmp-pipeline` drives the external toolchain.

pub mod collector;
pub mod config;
pub mod disasm;
pub mod error;
pub mod fingerprint;
pub mod obs;
pub mod revision;
pub mod safety;
pub mod store;
pub mod telemetry;

pub use collector::{collect_objects, iterate_objects};
pub use config::{BuildConfig, Tool, Toolchain};
pub use disasm::{Disassembly, LineToken, Section, VolatileFilter};
pub use error::{CompareError, Result};
pub use fingerprint::{ContentHash, FsSectionStore, SectionStore};
pub use revision::{validate_batch, PatchOverrides, RevisionId};
pub use safety::{SafePath, SafetyGuard};
pub use store::{ArtifactStore, AssumeAnswer, Confirm, SectionFingerprint, StdinConfirm};
