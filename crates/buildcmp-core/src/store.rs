//! On-disk layout of a comparison session.
//!
//! ```text
//! <root>/<rev>/                 section fingerprints (<hash>.dis)
//! <root>/<rev>.o/               collected object files
//! <root>/<rev>.sections.json    hash -> object/section index
//! <root>/<exe>.<rev>            built executable
//! <root>/<exe>.<rev>.stripped   executable without build-id, symbols, debug info
//! ```

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CompareError, Result};
use crate::fingerprint::{ContentHash, FsSectionStore};
use crate::revision::RevisionId;
use crate::safety::SafetyGuard;

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;
}

/// Prompt on stdout, read the answer from stdin. End of input means no.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt} [y/n] ")?;
        stdout.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

/// Fixed answer, for non-interactive runs and tests.
pub struct AssumeAnswer(pub bool);

impl Confirm for AssumeAnswer {
    fn confirm(&mut self, _prompt: &str) -> io::Result<bool> {
        Ok(self.0)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

/// Where a section came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFingerprint {
    /// Object path relative to the objects snapshot.
    pub object: PathBuf,
    pub section: String,
    pub hash: ContentHash,
}

/// Target directory of one comparison session.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create the target directory for this run.
    ///
    /// An existing directory is kept (continuing an earlier session) unless
    /// the operator confirms its removal, which is only offered when the
    /// guard allows deleting it.
    pub fn open(root: &Path, guard: &SafetyGuard, confirm: &mut dyn Confirm) -> Result<Self> {
        if root.exists() {
            warn!(
                "{} already exists, remove it if you don't want to continue a current comparison session",
                root.display()
            );
            if let Ok(safe) = guard.check(root) {
                if confirm.confirm(&format!("Delete {}?", root.display()))? {
                    info!("Removing {}", root.display());
                    safe.remove_all()?;
                }
            }
        }
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<rev>`: section fingerprints.
    pub fn analysis_dir(&self, rev: &RevisionId) -> PathBuf {
        self.root.join(rev.as_str())
    }

    /// `<root>/<rev>.o`: collected object files.
    pub fn objects_dir(&self, rev: &RevisionId) -> PathBuf {
        self.root.join(format!("{rev}.o"))
    }

    /// `<root>/<rev>.sections.json`
    pub fn index_path(&self, rev: &RevisionId) -> PathBuf {
        self.root.join(format!("{rev}.sections.json"))
    }

    /// `<root>/<basename>.<rev>`
    pub fn executable_path(&self, executable: &str, rev: &RevisionId) -> PathBuf {
        let base = Path::new(executable)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| executable.to_string());
        self.root.join(format!("{base}.{rev}"))
    }

    /// `<root>/<basename>.<rev>.stripped`
    pub fn stripped_path(&self, executable: &str, rev: &RevisionId) -> PathBuf {
        let mut path = self.executable_path(executable, rev).into_os_string();
        path.push(".stripped");
        PathBuf::from(path)
    }

    /// Claim the analysis directory of `rev`.
    ///
    /// Fails with [`CompareError::PreexistingArtifactDirectory`] when an
    /// earlier run already produced it; that revision must not be rebuilt.
    pub fn claim_revision(&self, rev: &RevisionId) -> Result<PathBuf> {
        let dir = self.analysis_dir(rev);
        match fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(CompareError::PreexistingArtifactDirectory(dir))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Section store inside the analysis directory of `rev`.
    pub fn sections(&self, rev: &RevisionId) -> Result<FsSectionStore> {
        FsSectionStore::new(self.analysis_dir(rev))
    }

    /// Write the fingerprint index of `rev`.
    pub fn write_index(&self, rev: &RevisionId, fingerprints: &[SectionFingerprint]) -> Result<()> {
        let json = serde_json::to_string_pretty(fingerprints)?;
        fs::write(self.index_path(rev), json)?;
        Ok(())
    }

    /// Commands an operator runs next to compare the first two revisions.
    pub fn comparison_commands(&self, revisions: &[RevisionId]) -> Vec<String> {
        match revisions {
            [first, second, ..] => vec![
                format!("sha256sum {}/*.stripped", self.root.display()),
                format!(
                    "git diff -W --word-diff {} {}",
                    self.analysis_dir(first).display(),
                    self.analysis_dir(second).display()
                ),
            ],
            _ => Vec::new(),
        }
    }
}
