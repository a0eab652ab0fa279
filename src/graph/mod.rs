//! Module dependency graph
//!
//! Per-file static/dynamic dependency records are merged into a single
//! directed graph. Nodes are module-qualified identifiers; the emitted link
//! map is inverted to required-by edges, matching the
//! `module-dependencies.json` wire format.

pub mod bundles;
pub mod cycles;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::Module;

pub use bundles::LazyBundles;
pub use cycles::detect_bundle_cycles;

/// One node of the emitted graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: String,
}

/// The emitted graph: `{nodes: {name: {path}}, links: {name: [dependedOnBy...]}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub links: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Restrict the graph to nodes owned by one module, resolving ownership
    /// from the node name prefix.
    pub fn split_for(&self, module: &str) -> DependencyGraph {
        DependencyGraph {
            nodes: self
                .nodes
                .iter()
                .filter(|(name, _)| Module::owner_of(name) == module)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            links: self
                .links
                .iter()
                .filter(|(name, _)| Module::owner_of(name) == module)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Accumulates per-file dependency records into a shared node/link mapping.
///
/// Forward dependency edges are kept internally; `to_graph` inverts them into
/// the required-by form for emission. The builder is embedded in the build
/// cache so the graph is cumulative across incremental runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphBuilder {
    nodes: BTreeMap<String, String>,
    deps: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one file's dependency record. Re-merging a node replaces its
    /// path and adds to its dependency set.
    pub fn merge(&mut self, name: &str, path: &str, deps: &[String]) {
        self.nodes.insert(name.to_string(), path.to_string());
        let entry = self.deps.entry(name.to_string()).or_default();
        for dep in deps {
            entry.insert(dep.clone());
        }
    }

    /// Drop a node and its outgoing edges (used when its source is deleted).
    pub fn remove(&mut self, name: &str) {
        self.nodes.remove(name);
        self.deps.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_path(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).map(String::as_str)
    }

    pub fn deps_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.deps.get(name)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Emit the merged graph with links inverted to required-by edges.
    pub fn to_graph(&self) -> DependencyGraph {
        let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, deps) in &self.deps {
            for dep in deps {
                links.entry(dep.clone()).or_default().push(name.clone());
            }
        }
        for required_by in links.values_mut() {
            required_by.sort();
            required_by.dedup();
        }
        DependencyGraph {
            nodes: self
                .nodes
                .iter()
                .map(|(name, path)| (name.clone(), GraphNode { path: path.clone() }))
                .collect(),
            links,
        }
    }

    /// Walk from the given entry points and collect reachable names that do
    /// not resolve to a registered node. Such names are warned about and
    /// excluded from output, never fatal.
    pub fn unresolved_from(&self, entry_points: &[String]) -> Vec<String> {
        let mut missing = BTreeSet::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = entry_points.iter().map(String::as_str).collect();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if !self.nodes.contains_key(name) {
                missing.insert(name.to_string());
                continue;
            }
            if let Some(deps) = self.deps.get(name) {
                for dep in deps {
                    queue.push_back(dep);
                }
            }
        }

        missing.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_nodes_and_edges() {
        let mut builder = DependencyGraphBuilder::new();
        builder.merge("A/x", "A/x.js", &["B/y".to_string()]);
        builder.merge("A/x", "A/x.js", &["B/z".to_string()]);

        let deps = builder.deps_of("A/x").unwrap();
        assert!(deps.contains("B/y"));
        assert!(deps.contains("B/z"));
    }

    #[test]
    fn to_graph_inverts_links_to_required_by() {
        let mut builder = DependencyGraphBuilder::new();
        builder.merge("A/x", "A/x.js", &["B/y".to_string()]);
        builder.merge("B/y", "B/y.js", &[]);

        let graph = builder.to_graph();
        assert_eq!(graph.links.get("B/y").unwrap(), &vec!["A/x".to_string()]);
        assert_eq!(graph.nodes.get("A/x").unwrap().path, "A/x.js");
    }

    #[test]
    fn unresolved_from_reports_missing_reachable_nodes() {
        let mut builder = DependencyGraphBuilder::new();
        builder.merge("A/x", "A/x.js", &["B/gone".to_string()]);

        let missing = builder.unresolved_from(&["A/x".to_string()]);
        assert_eq!(missing, vec!["B/gone".to_string()]);
    }

    #[test]
    fn unresolved_from_ignores_unreachable_nodes() {
        let mut builder = DependencyGraphBuilder::new();
        builder.merge("A/x", "A/x.js", &[]);
        builder.merge("C/z", "C/z.js", &["D/gone".to_string()]);

        let missing = builder.unresolved_from(&["A/x".to_string()]);
        assert!(missing.is_empty());
    }

    #[test]
    fn split_for_keeps_only_owned_nodes() {
        let mut builder = DependencyGraphBuilder::new();
        builder.merge("A/x", "A/x.js", &["B/y".to_string()]);
        builder.merge("B/y", "B/y.js", &[]);

        let shard = builder.to_graph().split_for("B");
        assert!(shard.nodes.contains_key("B/y"));
        assert!(!shard.nodes.contains_key("A/x"));
        assert!(shard.links.contains_key("B/y"));
    }
}
