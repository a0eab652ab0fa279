//! Build cache: the load-once/save-once store behind incremental builds
//!
//! Holds the file hash index, per-module compiled-file metadata (dependency
//! records, routes, theme associations), the cumulative module-dependency
//! graph, and the localization dictionary sub-cache. Owns the invalidation
//! policy: a recorded tool version or run-parameter mismatch fails safe toward
//! a full invalidation, never a crash, and any load error is treated as a
//! cold start.

pub mod changes;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RunParams;
use crate::error::KilnResult;
use crate::fsutil;
use crate::graph::DependencyGraphBuilder;
use crate::hash::ContentHash;
use crate::model::StyleTheme;

pub use changes::{ChangeDetector, FileStatus};

/// Per-file record: hash, outputs, and compiled metadata reused when the file
/// is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub hash: Option<ContentHash>,
    /// Advisory; never trusted for change detection on its own
    pub mtime: Option<u64>,
    /// Output paths relative to the output root
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Module-qualified node name extracted from the compiled text
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    /// Route path -> controller extracted from this file
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    /// True when reused from the prior run without recompilation
    #[serde(default)]
    pub cached: bool,
    /// Liveness marker; entries not marked live at save time are dropped
    #[serde(skip)]
    live: bool,
}

impl FileEntry {
    pub fn new(hash: ContentHash, mtime: Option<u64>) -> Self {
        Self {
            hash: Some(hash),
            mtime,
            live: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheData {
    #[serde(default)]
    params: RunParams,
    /// module -> relative path -> entry
    #[serde(default)]
    files: BTreeMap<String, BTreeMap<String, FileEntry>>,
    /// theme cache key -> theme; accumulation is last-write-wins per key
    #[serde(default)]
    themes: BTreeMap<String, StyleTheme>,
    /// module -> less configuration blob
    #[serde(default)]
    less_configs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    graph: DependencyGraphBuilder,
    /// locale -> dictionary keys; survives invalidation (expensive to rebuild
    /// and independent of most run parameters)
    #[serde(default)]
    dictionary: BTreeMap<String, BTreeSet<String>>,
}

/// Process-wide build cache, loaded once per run and saved once at the end.
#[derive(Debug)]
pub struct BuildCache {
    path: PathBuf,
    first_build: bool,
    data: CacheData,
}

impl BuildCache {
    /// Load the cache file, treating any I/O or parse failure as "no prior
    /// cache". The pipeline then produces a correct, if unoptimized, full
    /// rebuild instead of aborting.
    pub fn load(path: &Path) -> Self {
        let data = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheData>(&text).ok());
        let first_build = data.is_none();
        Self {
            path: path.to_path_buf(),
            first_build,
            data: data.unwrap_or_default(),
        }
    }

    /// True when no prior cache was found. Downstream components use this to
    /// justify a more expensive source-of-truth lookup instead of trusting
    /// partial cache state.
    pub fn is_first_build(&self) -> bool {
        self.first_build
    }

    /// Write the cache back atomically. Entries not marked live this run are
    /// dropped (tombstone-by-omission).
    pub fn save(&mut self) -> KilnResult<()> {
        for module in self.data.files.values_mut() {
            module.retain(|_, entry| entry.live);
        }
        self.data.files.retain(|_, module| !module.is_empty());
        let json = serde_json::to_vec_pretty(&self.data)?;
        fsutil::atomic_write(&self.path, &json)
    }

    /// Invalidate everything except the dictionary sub-cache when the
    /// recorded tool version or run parameters differ from the current run.
    /// Returns true when an invalidation happened.
    pub fn clear_if_needed(&mut self, params: &RunParams) -> bool {
        if self.first_build {
            self.data.params = params.clone();
            return false;
        }
        if self.data.params == *params {
            return false;
        }
        let dictionary = std::mem::take(&mut self.data.dictionary);
        self.data = CacheData {
            params: params.clone(),
            dictionary,
            ..CacheData::default()
        };
        true
    }

    // --- file records ---

    pub fn file(&self, module: &str, rel: &str) -> Option<&FileEntry> {
        self.data.files.get(module)?.get(rel)
    }

    pub fn module_files(&self, module: &str) -> Option<&BTreeMap<String, FileEntry>> {
        self.data.files.get(module)
    }

    /// Record a freshly compiled file. The entry is marked live.
    pub fn record_file(&mut self, module: &str, rel: &str, mut entry: FileEntry) {
        entry.live = true;
        self.data
            .files
            .entry(module.to_string())
            .or_default()
            .insert(rel.to_string(), entry);
    }

    /// Mark an unchanged file's prior entry as still valid, returning its
    /// known outputs so they can be confirmed without recompilation.
    pub fn revalidate(&mut self, module: &str, rel: &str) -> Option<&FileEntry> {
        let entry = self.data.files.get_mut(module)?.get_mut(rel)?;
        entry.live = true;
        entry.cached = true;
        Some(entry)
    }

    /// Every output path recorded in the cache, for stale-output reconciling.
    pub fn output_paths(&self) -> BTreeSet<String> {
        let mut outputs = BTreeSet::new();
        for module in self.data.files.values() {
            for entry in module.values() {
                for output in &entry.outputs {
                    outputs.insert(output.clone());
                }
            }
        }
        outputs
    }

    // --- theme accumulation (commutative, last-write-wins per key) ---

    pub fn add_style_theme(&mut self, theme: StyleTheme) {
        self.data.themes.insert(theme.cache_key(), theme);
    }

    /// New-style themes carry structured configuration; stored under the same
    /// key space so a definition upgrade replaces the old entry.
    pub fn add_new_style_theme(&mut self, theme: StyleTheme) {
        self.data.themes.insert(theme.cache_key(), theme);
    }

    pub fn add_module_less_config(&mut self, module: &str, config: serde_json::Value) {
        self.data.less_configs.insert(module.to_string(), config);
    }

    pub fn themes(&self) -> impl Iterator<Item = &StyleTheme> {
        self.data.themes.values()
    }

    pub fn less_config(&self, module: &str) -> Option<&serde_json::Value> {
        self.data.less_configs.get(module)
    }

    // --- dependency graph ---

    pub fn graph(&self) -> &DependencyGraphBuilder {
        &self.data.graph
    }

    pub fn graph_mut(&mut self) -> &mut DependencyGraphBuilder {
        &mut self.data.graph
    }

    /// The merged dependency graph as of current cache state, for emission as
    /// the top-level `module-dependencies.json` artifact.
    pub fn module_dependencies(&self) -> crate::graph::DependencyGraph {
        self.data.graph.to_graph()
    }

    // --- localization dictionary sub-cache ---

    pub fn set_dictionary(&mut self, locale: &str, keys: BTreeSet<String>) {
        self.data.dictionary.insert(locale.to_string(), keys);
    }

    pub fn dictionary(&self, locale: &str) -> Option<&BTreeSet<String>> {
        self.data.dictionary.get(locale)
    }

    pub fn dictionary_keys(&self) -> BTreeSet<String> {
        self.data
            .dictionary
            .values()
            .flat_map(|keys| keys.iter().cloned())
            .collect()
    }
}
