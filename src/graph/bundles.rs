//! Lazy bundle registry
//!
//! A lazy bundle is a named grouping of internal modules packed invisibly into
//! a host module, plus the external dependency names those internal modules
//! require. An internal module may belong to at most one bundle; a second
//! assignment is a fatal configuration error.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::BundleConfig;
use crate::error::{KilnError, KilnResult};

use super::DependencyGraphBuilder;

/// One lazy bundle definition as emitted into `lazy-bundles.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyBundle {
    pub name: String,
    pub host: String,
    pub modules: BTreeSet<String>,
    /// External dependency names required by the bundle's internal modules
    #[serde(default)]
    pub external: BTreeSet<String>,
}

/// Registry of all lazy bundles for the run
#[derive(Debug, Clone, Default)]
pub struct LazyBundles {
    bundles: BTreeMap<String, LazyBundle>,
    owner: BTreeMap<String, String>,
}

impl LazyBundles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, enforcing exclusivity before
    /// any packing proceeds.
    pub fn from_config(configs: &[BundleConfig]) -> KilnResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            for module in &config.modules {
                registry.assign(module, &config.name, &config.host)?;
            }
        }
        Ok(registry)
    }

    /// Assign an internal module to a bundle. Fails if the module already
    /// belongs to a different bundle.
    pub fn assign(&mut self, module: &str, bundle: &str, host: &str) -> KilnResult<()> {
        if let Some(first) = self.owner.get(module) {
            if first != bundle {
                return Err(KilnError::BundleConflict {
                    module: module.to_string(),
                    first: first.clone(),
                    second: bundle.to_string(),
                });
            }
            return Ok(());
        }
        self.owner.insert(module.to_string(), bundle.to_string());
        let entry = self.bundles.entry(bundle.to_string()).or_insert_with(|| LazyBundle {
            name: bundle.to_string(),
            host: host.to_string(),
            ..LazyBundle::default()
        });
        entry.modules.insert(module.to_string());
        Ok(())
    }

    /// Compute each bundle's external dependency set from the merged graph:
    /// everything an internal module requires that is not itself internal.
    pub fn resolve_externals(&mut self, graph: &DependencyGraphBuilder) {
        for bundle in self.bundles.values_mut() {
            bundle.external.clear();
            for module in &bundle.modules {
                if let Some(deps) = graph.deps_of(module) {
                    for dep in deps {
                        if !bundle.modules.contains(dep) {
                            bundle.external.insert(dep.clone());
                        }
                    }
                }
            }
        }
    }

    pub fn bundle(&self, name: &str) -> Option<&LazyBundle> {
        self.bundles.get(name)
    }

    pub fn bundles(&self) -> impl Iterator<Item = &LazyBundle> {
        self.bundles.values()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Bundle owning an internal module, if any
    pub fn owner_of(&self, module: &str) -> Option<&str> {
        self.owner.get(module).map(String::as_str)
    }

    /// Definitions for `lazy-bundles.json`
    pub fn definitions(&self) -> Vec<&LazyBundle> {
        self.bundles.values().collect()
    }

    /// Flat module -> bundle-name lookup for `lazy-bundles-map.json`
    pub fn to_map(&self) -> &BTreeMap<String, String> {
        &self.owner
    }
}
