//! Content hashes of disassembled sections and their on-disk store.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{CompareError, Result};

/// File extension of persisted section texts.
pub const SECTION_FILE_EXT: &str = "dis";

/// SHA-256 of a section's filtered text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute the hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Name of the file the section is stored under.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.to_hex(), SECTION_FILE_EXT)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentHash({})",
            self.to_hex().chars().take(12).collect::<String>()
        )
    }
}

impl FromStr for ContentHash {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|_| CompareError::InvalidConfig(format!("invalid content hash: {s}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CompareError::InvalidConfig(format!("invalid content hash: {s}")))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = CompareError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Content-addressed store of section texts.
pub trait SectionStore {
    /// Store `text` and return its hash. Identical texts are stored once.
    fn put(&self, text: &str) -> Result<ContentHash>;

    fn exists(&self, hash: &ContentHash) -> Result<bool>;
}

/// Flat directory of `<hash>.dis` files.
///
/// Unsharded; two revisions' directories are compared by file name.
pub struct FsSectionStore {
    dir: PathBuf,
}

impl FsSectionStore {
    /// Open the store at `dir`, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn section_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(hash.file_name())
    }

    /// Hashes of every section currently in the store, sorted.
    pub fn hashes(&self) -> Result<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SECTION_FILE_EXT) {
                continue;
            }
            if let Some(hash) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                hashes.push(hash);
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

impl SectionStore for FsSectionStore {
    fn put(&self, text: &str) -> Result<ContentHash> {
        let hash = ContentHash::compute(text.as_bytes());
        let path = self.section_path(&hash);

        if self.exists(&hash)? {
            return Ok(hash);
        }

        // Write to a temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(hash)
    }

    fn exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.section_path(hash).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, PathBuf, FsSectionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("4b5b263");
        let store = FsSectionStore::new(&dir).unwrap();
        (tmp, dir, store)
    }

    #[test]
    fn hash_display_fromstr_roundtrip() {
        let h = ContentHash::compute(b"Disassembly of section .text.main:");
        let hex = h.to_string();
        assert_eq!(hex.len(), 64);
        let parsed: ContentHash = hex.parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hash_fromstr_rejects_bad_input() {
        assert!("not-valid-hex".parse::<ContentHash>().is_err());
        assert!("abcd".parse::<ContentHash>().is_err());
    }

    #[test]
    fn identical_text_identical_hash() {
        let a = ContentHash::compute(b"  0:\tpush   %rbp");
        let b = ContentHash::compute(b"  0:\tpush   %rbp");
        assert_eq!(a, b);
        assert_eq!(a.file_name(), b.file_name());
    }

    #[test]
    fn different_text_different_hash() {
        let a = ContentHash::compute(b"  0:\tmov    $0x1,%eax");
        let b = ContentHash::compute(b"  0:\tmov    $0x2,%eax");
        assert_ne!(a, b);
    }

    #[test]
    fn file_name_uses_dis_extension() {
        let h = ContentHash::compute(b"x");
        assert!(h.file_name().ends_with(".dis"));
        assert!(h.file_name().starts_with(&h.to_hex()));
    }

    #[test]
    fn put_writes_text_under_its_hash() {
        let (_tmp, dir, store) = make_store();
        let text = "Disassembly of section .text.foo:\n\n0000000000000000 <foo()>:";
        let hash = store.put(text).unwrap();
        assert_eq!(fs::read_to_string(dir.join(hash.file_name())).unwrap(), text);
        assert!(store.exists(&hash).unwrap());
    }

    #[test]
    fn dedupe_invariant() {
        let (_tmp, dir, store) = make_store();
        let h1 = store.put("same section").unwrap();
        let h2 = store.put("same section").unwrap();
        assert_eq!(h1, h2);

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn hashes_lists_only_section_files() {
        let (_tmp, dir, store) = make_store();
        let a = store.put("a").unwrap();
        let b = store.put("b").unwrap();
        fs::write(dir.join("notes.txt"), "ignore me").unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.hashes().unwrap(), expected);
    }

    #[test]
    fn exists_false_for_missing() {
        let (_tmp, _dir, store) = make_store();
        assert!(!store.exists(&ContentHash::compute(b"missing")).unwrap());
    }
}
