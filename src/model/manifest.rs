//! Contents manifest: the whole-application metadata aggregate
//!
//! The joined manifest holds the module list, per-module JS entry points, the
//! static-HTML route map, localization dictionary keys, and service URLs. At
//! packaging time it is split per module: each shard keeps the identical
//! schema restricted to the keys whose resolved owning module matches.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Module;

/// Route metadata for one static-HTML route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Module-qualified controller name, e.g. `Shell/pages/main`
    pub controller: String,
}

impl RouteInfo {
    pub fn owner(&self) -> &str {
        Module::owner_of(&self.controller)
    }
}

/// The whole-application metadata aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentsManifest {
    /// Module name -> module output directory name
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    /// Entry name -> module-qualified JS entry point
    #[serde(default)]
    pub js_entries: BTreeMap<String, String>,
    /// Route path -> route metadata
    #[serde(default)]
    pub routes: BTreeMap<String, RouteInfo>,
    /// Localization dictionary keys (module-qualified: `Module.some.key`)
    #[serde(default)]
    pub dictionary: BTreeSet<String>,
    /// Service name -> URL
    #[serde(default)]
    pub service_urls: BTreeMap<String, String>,
}

impl ContentsManifest {
    /// Restrict the manifest to the keys owned by one module.
    ///
    /// A dictionary key `A.some.key` lands only in module `A`'s shard; routes
    /// and entries resolve their owner from the module-qualified controller or
    /// entry name. Service URLs are application-global and are repeated in
    /// every shard.
    pub fn split_for(&self, module: &str) -> ContentsManifest {
        ContentsManifest {
            modules: self
                .modules
                .iter()
                .filter(|(name, _)| name.as_str() == module)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            js_entries: self
                .js_entries
                .iter()
                .filter(|(_, entry)| Module::owner_of(entry) == module)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            routes: self
                .routes
                .iter()
                .filter(|(_, info)| info.owner() == module)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            dictionary: self
                .dictionary
                .iter()
                .filter(|key| Module::owner_of_key(key) == module)
                .cloned()
                .collect(),
            service_urls: self.service_urls.clone(),
        }
    }

    /// Render the manifest as the `contents.js` runtime artifact.
    pub fn to_contents_js(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("contents={json};")
    }
}

/// Extract ordered preload URLs from a module descriptor's
/// `<preload>...</preload>` section.
///
/// Lines inside the section are trimmed; empty lines are skipped. A
/// descriptor without the section yields an empty list.
pub fn extract_preload_urls(descriptor: &str) -> Vec<String> {
    let Some(start) = descriptor.find("<preload>") else {
        return Vec::new();
    };
    let after = &descriptor[start + "<preload>".len()..];
    let Some(end) = after.find("</preload>") else {
        return Vec::new();
    };
    after[..end]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
