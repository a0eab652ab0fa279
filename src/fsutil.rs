//! File-system helpers: atomic writes and source walking
//!
//! Atomic writes use the temp-file + rename discipline so a failed run never
//! leaves a partially written artifact behind.

use std::path::{Path, PathBuf};

use crate::error::KilnResult;

/// Write content to a file atomically.
///
/// The content is written to a temporary file in the target directory and
/// then renamed over the destination, so readers never observe a torn write.
pub fn atomic_write(path: &Path, content: &[u8]) -> KilnResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, content)?;
    tmp.persist(path)
        .map_err(|e| crate::error::KilnError::Io(e.error))?;
    Ok(())
}

/// Enumerate source files under a module root.
///
/// Uses the `ignore` walker: hidden files and anything matched by standard
/// ignore files are excluded. Returns paths relative to `root`, sorted for
/// deterministic pipeline order.
pub fn walk_sources(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build();
    for entry in walker.flatten() {
        if entry.file_type().is_some_and(|t| t.is_file()) {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    files
}

/// Normalize a path for storage in persisted JSON (always forward slashes).
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Modification time of a file in whole seconds since the epoch, if available.
///
/// Advisory only; the change detector trusts content hashes.
pub fn mtime_secs(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
