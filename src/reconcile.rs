//! Stale output reconciling
//!
//! Computes the set of previously produced output paths no longer backed by
//! any current source, expands each with its derived sibling artifacts
//! (minified, compressed, theme-joined), and removes them best-effort with
//! bounded concurrency. No other component deletes output paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

/// Result of a removal pass
#[derive(Debug, Clone, Default)]
pub struct RemovalResult {
    pub removed: Vec<PathBuf>,
    /// Paths that were already gone; not an error
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Derived sibling artifacts of one output path, per the original file's
/// extension-specific derivation rules.
pub fn derived_siblings(path: &Path) -> Vec<PathBuf> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Vec::new();
    };
    let stem = path.with_extension("");
    let stem = stem.to_string_lossy();

    let mut siblings = Vec::new();
    match ext {
        "css" => {
            siblings.push(PathBuf::from(format!("{stem}.min.css")));
            siblings.push(PathBuf::from(format!("{stem}.css.gz")));
            siblings.push(PathBuf::from(format!("{stem}.min.css.gz")));
            siblings.push(PathBuf::from(format!("{stem}_joined.css")));
        }
        "js" => {
            siblings.push(PathBuf::from(format!("{stem}.min.js")));
            siblings.push(PathBuf::from(format!("{stem}.js.gz")));
            siblings.push(PathBuf::from(format!("{stem}.min.js.gz")));
        }
        "html" => {
            siblings.push(PathBuf::from(format!("{stem}.min.html")));
            siblings.push(PathBuf::from(format!("{stem}.html.gz")));
        }
        _ => {}
    }
    siblings
}

/// Computes and removes stale outputs
#[derive(Debug, Clone)]
pub struct OutputReconciler {
    prior: BTreeSet<String>,
    current: BTreeSet<String>,
}

impl OutputReconciler {
    /// `prior` is the previous cache's full output path set; `current` is
    /// this run's written/confirmed-valid set. Both are output-root relative.
    pub fn new(prior: BTreeSet<String>, current: BTreeSet<String>) -> Self {
        Self { prior, current }
    }

    /// Output-root-relative paths to remove: prior minus current, expanded
    /// with every derived sibling. Sorted, deduplicated.
    pub fn list_for_remove(&self) -> Vec<PathBuf> {
        let mut stale = BTreeSet::new();
        for path in self.prior.difference(&self.current) {
            let path = PathBuf::from(path);
            for sibling in derived_siblings(&path) {
                stale.insert(sibling);
            }
            stale.insert(path);
        }
        stale.into_iter().collect()
    }

    /// Remove stale outputs under `root` with bounded concurrency. A file
    /// already missing at delete time is not an error.
    pub fn remove_stale(&self, root: &Path) -> RemovalResult {
        let stale = self.list_for_remove();

        let outcomes: Vec<_> = stale
            .par_iter()
            .map(|rel| {
                let target = root.join(rel);
                match std::fs::remove_file(&target) {
                    Ok(()) => (rel.clone(), Ok(true)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        (rel.clone(), Ok(false))
                    }
                    Err(e) => (rel.clone(), Err(e.to_string())),
                }
            })
            .collect();

        let mut result = RemovalResult::default();
        for (rel, outcome) in outcomes {
            match outcome {
                Ok(true) => result.removed.push(rel),
                Ok(false) => result.missing.push(rel),
                Err(message) => result.failed.push((rel, message)),
            }
        }
        result
    }
}
