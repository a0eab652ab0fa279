//! Content hash value object
//!
//! A validated, immutable SHA-256 hash of file content, stored with the
//! `sha256:` prefix. Hash comparison (not timestamp comparison) is what the
//! change detector trusts: it survives checkout churn that preserves mtimes.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Content hash value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Prefix for SHA-256 hashes
    pub const PREFIX: &'static str = "sha256:";

    /// Create a ContentHash from a raw hash string (prefix added if missing)
    pub fn new(raw: &str) -> Self {
        if raw.starts_with(Self::PREFIX) {
            Self(raw.to_string())
        } else {
            Self(format!("{}{}", Self::PREFIX, raw))
        }
    }

    /// Compute the hash of in-memory content
    pub fn from_bytes(content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(content);
        Self(format!("{}{:x}", Self::PREFIX, digest))
    }

    /// Compute the hash of a file on disk
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Full hash string with prefix
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex part without the prefix
    pub fn hex(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }

    pub fn matches(&self, other: &ContentHash) -> bool {
        self.0 == other.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_adds_prefix_if_missing() {
        assert_eq!(ContentHash::new("abc123").as_str(), "sha256:abc123");
    }

    #[test]
    fn new_keeps_prefix_if_present() {
        assert_eq!(ContentHash::new("sha256:abc").as_str(), "sha256:abc");
    }

    #[test]
    fn from_bytes_computes_sha256() {
        let hash = ContentHash::from_bytes(b"hello");
        assert!(hash.as_str().starts_with("sha256:"));
        assert_eq!(hash.hex().len(), 64);
    }

    #[test]
    fn same_content_same_hash() {
        assert!(ContentHash::from_bytes(b"x").matches(&ContentHash::from_bytes(b"x")));
    }

    #[test]
    fn different_content_different_hash() {
        assert!(!ContentHash::from_bytes(b"x").matches(&ContentHash::from_bytes(b"y")));
    }

    #[test]
    fn from_file_matches_from_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "define();").unwrap();
        assert_eq!(
            ContentHash::from_file(&path).unwrap(),
            ContentHash::from_bytes(b"define();")
        );
    }

    #[test]
    fn serde_roundtrip_is_transparent() {
        let hash = ContentHash::new("abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"sha256:abc\"");
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
