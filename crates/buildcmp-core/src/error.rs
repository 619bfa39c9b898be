//! Error taxonomy for buildcmp.

use std::path::PathBuf;

/// Errors produced while staging, building and fingerprinting revisions.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("path {path:?} may not be deleted or overwritten; use a directory below {root:?}")]
    PathSafetyViolation { path: PathBuf, root: PathBuf },

    #[error("{0} is not a hexadecimal commit id")]
    InvalidRevisionId(String),

    #[error("could not apply patch {patch:?} to strip build info; it probably needs to be updated")]
    PatchApplyFailure { patch: PathBuf, command: String },

    #[error("command failed with {status}: {command}")]
    SubprocessFailure { command: String, status: String },

    #[error("disassembly of {object:?} failed: {detail}")]
    AnalysisFailure { object: PathBuf, detail: String },

    #[error("{format} output of {object:?} is not covered by the {policy} volatile-line filter")]
    FilterGap {
        object: PathBuf,
        format: String,
        policy: String,
    },

    #[error("{0:?} already exists")]
    PreexistingArtifactDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompareError {
    /// Whether this error must abort the whole batch.
    ///
    /// Only a pre-existing per-revision directory is recoverable: that
    /// revision is skipped and the run moves on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CompareError::PreexistingArtifactDirectory(_))
    }
}

/// Result type for buildcmp operations.
pub type Result<T> = std::result::Result<T, CompareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_revision_display() {
        let err = CompareError::InvalidRevisionId("not-a-hash!".to_string());
        assert!(err.to_string().contains("not-a-hash!"));
        assert!(err.to_string().contains("hexadecimal"));
    }

    #[test]
    fn test_subprocess_failure_carries_command_line() {
        let err = CompareError::SubprocessFailure {
            command: "make -j4 src/exampled".to_string(),
            status: "exit status: 2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("make -j4 src/exampled"));
        assert!(msg.contains("exit status: 2"));
    }

    #[test]
    fn test_only_preexisting_directory_is_recoverable() {
        assert!(!CompareError::PreexistingArtifactDirectory(PathBuf::from("/tmp/x")).is_fatal());
        assert!(CompareError::InvalidRevisionId("zz".to_string()).is_fatal());
        assert!(CompareError::PathSafetyViolation {
            path: PathBuf::from("/etc"),
            root: PathBuf::from("/tmp"),
        }
        .is_fatal());
    }
}
