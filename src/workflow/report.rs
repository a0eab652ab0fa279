//! Build report
//!
//! Per-file errors and warnings are accumulated here instead of aborting the
//! run; the report is written next to the other top-level artifacts at the
//! end of every run, successful or not.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KilnResult;
use crate::fsutil;

/// One error or warning, attributed to a module and optionally a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Aggregated outcome of one build run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<ReportEntry>,
    #[serde(default)]
    pub warnings: Vec<ReportEntry>,
    /// Files compiled this run
    #[serde(default)]
    pub compiled: usize,
    /// Files reused from the cache without recompilation
    #[serde(default)]
    pub cached: usize,
    /// Stale outputs removed by the reconciler
    #[serde(default)]
    pub removed: usize,
    #[serde(default)]
    pub modules_built: usize,
    #[serde(default)]
    pub modules_skipped: usize,
}

impl BuildReport {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            finished: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            compiled: 0,
            cached: 0,
            removed: 0,
            modules_built: 0,
            modules_skipped: 0,
        }
    }

    pub fn error(&mut self, module: &str, path: Option<&str>, message: impl Into<String>) {
        self.errors.push(ReportEntry {
            module: module.to_string(),
            path: path.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn warning(&mut self, module: &str, path: Option<&str>, message: impl Into<String>) {
        self.warnings.push(ReportEntry {
            module: module.to_string(),
            path: path.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn push_error(&mut self, entry: ReportEntry) {
        self.errors.push(entry);
    }

    pub fn push_warning(&mut self, entry: ReportEntry) {
        self.warnings.push(entry);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(&mut self) {
        self.finished = Some(Utc::now());
    }

    /// Write the report artifact atomically.
    pub fn save(&self, path: &Path) -> KilnResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fsutil::atomic_write(path, &json)
    }
}

impl Default for BuildReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_accumulate() {
        let mut report = BuildReport::new();
        report.error("Shell", Some("panel/view.tmpl"), "unexpected token");
        report.warning("graph", None, "unresolved node 'Gone/x'");

        assert!(report.has_errors());
        assert_eq!(report.errors[0].path.as_deref(), Some("panel/view.tmpl"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build-report.json");

        let mut report = BuildReport::new();
        report.error("Shell", None, "boom");
        report.compiled = 4;
        report.finish();
        report.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: BuildReport = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.errors, report.errors);
        assert_eq!(loaded.compiled, 4);
        assert!(loaded.finished.is_some());
    }

    #[test]
    fn entry_without_path_omits_field() {
        let entry = ReportEntry {
            module: "Shell".to_string(),
            path: None,
            message: "m".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            "{\"module\":\"Shell\",\"message\":\"m\"}"
        );
    }
}
