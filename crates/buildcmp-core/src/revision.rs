//! Revision identifiers and per-revision patch selection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};

/// Patch applied to every revision that has no override.
pub const DEFAULT_PATCH: &str = "stripbuildinfo.patch";

/// A revision identifier, accepted only as a hexadecimal token.
///
/// The value is never interpreted numerically; it is handed to the
/// version-control client verbatim and used as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

impl RevisionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RevisionId {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CompareError::InvalidRevisionId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RevisionId {
    type Error = CompareError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a whole batch of identifiers up front.
///
/// Either every identifier parses, or the batch is rejected with the first
/// offending one and nothing is returned.
pub fn validate_batch<S: AsRef<str>>(ids: &[S]) -> Result<Vec<RevisionId>> {
    ids.iter().map(|id| id.as_ref().parse()).collect()
}

/// Per-revision overrides of the build-info stripping patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOverrides {
    overrides: BTreeMap<RevisionId, String>,
}

impl PatchOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    /// Pair a comma-separated patch list positionally with `revisions`.
    ///
    /// Fewer patches than revisions is fine: the remainder use the default.
    /// More patches than revisions would leave entries without a revision
    /// and is rejected.
    pub fn pair(revisions: &[RevisionId], patches: &str) -> Result<Self> {
        let names: Vec<String> = patches.split(',').map(|p| p.trim().to_string()).collect();
        if names.len() > revisions.len() {
            return Err(CompareError::InvalidConfig(format!(
                "{} patches given for {} revisions",
                names.len(),
                revisions.len()
            )));
        }
        if let Some(pos) = names.iter().position(|n| n.is_empty()) {
            return Err(CompareError::InvalidConfig(format!(
                "patch #{} for {} is empty",
                pos + 1,
                revisions[pos]
            )));
        }
        let overrides = revisions.iter().cloned().zip(names).collect();
        Ok(Self { overrides })
    }

    /// The override for `revision`, if one was given.
    pub fn get(&self, revision: &RevisionId) -> Option<&str> {
        self.overrides.get(revision).map(String::as_str)
    }

    /// The patch to apply for `revision`.
    pub fn patch_for<'a>(&'a self, revision: &RevisionId, default: &'a str) -> &'a str {
        self.get(revision).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revs(ids: &[&str]) -> Vec<RevisionId> {
        validate_batch(ids).unwrap()
    }

    #[test]
    fn test_short_hash_accepted() {
        let id: RevisionId = "4b5b263".parse().unwrap();
        assert_eq!(id.as_str(), "4b5b263");
        assert!("D1BC5BF".parse::<RevisionId>().is_ok());
        assert!("0123456789abcdef0123456789abcdef01234567"
            .parse::<RevisionId>()
            .is_ok());
    }

    #[test]
    fn test_non_hex_rejected() {
        for bad in ["not-a-hash!", "", "4b5b26g", "0x4b5b263", " 4b5b263", "4b5b263/..", "HEAD"] {
            assert!(
                matches!(bad.parse::<RevisionId>(), Err(CompareError::InvalidRevisionId(ref s)) if s == bad),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let err = validate_batch(&["4b5b263", "not-a-hash!", "d1bc5bf"]).unwrap_err();
        assert!(matches!(err, CompareError::InvalidRevisionId(ref s) if s == "not-a-hash!"));

        let ok = validate_batch(&["4b5b263", "d1bc5bf"]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].to_string(), "d1bc5bf");
    }

    #[test]
    fn test_serde_rejects_invalid_ids() {
        let id: RevisionId = serde_json::from_str("\"4b5b263\"").unwrap();
        assert_eq!(id.as_str(), "4b5b263");
        assert!(serde_json::from_str::<RevisionId>("\"zzz\"").is_err());
    }

    #[test]
    fn test_patches_pair_positionally() {
        let ids = revs(&["4b5b263", "d1bc5bf"]);
        let overrides = PatchOverrides::pair(&ids, "old.patch, new.patch").unwrap();
        assert_eq!(overrides.get(&ids[0]), Some("old.patch"));
        assert_eq!(overrides.patch_for(&ids[1], DEFAULT_PATCH), "new.patch");
    }

    #[test]
    fn test_missing_patches_fall_back_to_default() {
        let ids = revs(&["4b5b263", "d1bc5bf"]);
        let overrides = PatchOverrides::pair(&ids, "old.patch").unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.patch_for(&ids[1], DEFAULT_PATCH), DEFAULT_PATCH);
        assert_eq!(
            PatchOverrides::none().patch_for(&ids[0], DEFAULT_PATCH),
            DEFAULT_PATCH
        );
    }

    #[test]
    fn test_dangling_patches_rejected() {
        let ids = revs(&["4b5b263"]);
        let err = PatchOverrides::pair(&ids, "a.patch,b.patch").unwrap_err();
        assert!(matches!(err, CompareError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_patch_entry_rejected() {
        let ids = revs(&["4b5b263", "d1bc5bf"]);
        assert!(PatchOverrides::pair(&ids, "a.patch,,").is_err());
        assert!(PatchOverrides::pair(&ids, ",b.patch").is_err());
    }
}
