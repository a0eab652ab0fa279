//! Per-file change classification
//!
//! Hash comparison against the prior cache is authoritative: it detects
//! checkout and branch-switch churn that preserves timestamps. Unchanged
//! files short-circuit all downstream compiler invocations; a module with
//! zero classified changes skips its whole pipeline stage.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::hash::ContentHash;

use super::BuildCache;

/// Change status of one source file relative to the prior cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Modified,
    Unchanged,
    /// Present in the prior cache, absent from the current walk
    Deleted,
}

/// Read-only view over the prior cache used during the parallel build phase.
pub struct ChangeDetector<'a> {
    cache: &'a BuildCache,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(cache: &'a BuildCache) -> Self {
        Self { cache }
    }

    /// Classify one walked file by comparing its current content hash with
    /// the recorded one.
    pub fn classify(&self, module: &str, rel: &str, current: &ContentHash) -> FileStatus {
        match self.cache.file(module, rel).and_then(|e| e.hash.as_ref()) {
            None => FileStatus::New,
            Some(prior) if prior.matches(current) => FileStatus::Unchanged,
            Some(_) => FileStatus::Modified,
        }
    }

    /// Files recorded for this module that no longer exist on disk. Queued
    /// for output removal by the reconciler.
    pub fn detect_deleted(&self, module: &str, walked: &BTreeSet<String>) -> Vec<String> {
        let Some(files) = self.cache.module_files(module) else {
            return Vec::new();
        };
        files
            .keys()
            .filter(|rel| !walked.contains(*rel))
            .cloned()
            .collect()
    }

    /// True when every walked file hashes equal to its recorded entry and
    /// nothing was deleted. Such a module is eligible to skip its whole
    /// per-module pipeline stage.
    pub fn module_unchanged(
        &self,
        module: &str,
        walked_hashes: &BTreeMap<String, ContentHash>,
    ) -> bool {
        if self.cache.is_first_build() {
            return false;
        }
        let Some(files) = self.cache.module_files(module) else {
            return walked_hashes.is_empty();
        };
        if files.len() != walked_hashes.len() {
            return false;
        }
        walked_hashes.iter().all(|(rel, hash)| {
            files
                .get(rel)
                .and_then(|e| e.hash.as_ref())
                .is_some_and(|prior| prior.matches(hash))
        })
    }
}
