//! Build configuration
//!
//! Loaded once from a TOML file at workflow start; immutable for the run.
//! Validation failures are fatal configuration errors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KilnError, KilnResult};

/// Raw on-disk configuration shape
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    /// Output root, relative to the config file
    output: Option<PathBuf>,
    /// Build release artifacts (minified, compressed, packed)
    #[serde(default)]
    release: bool,
    /// Maximum pending watch changes before a full rebuild supersedes
    /// per-file rebuilds
    rebuild_threshold: Option<usize>,
    #[serde(default, rename = "module")]
    modules: Vec<RawModule>,
    #[serde(default, rename = "bundle")]
    bundles: Vec<RawBundle>,
    #[serde(default)]
    service_urls: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    localization: Localization,
}

#[derive(Debug, Clone, Deserialize)]
struct RawModule {
    name: Option<String>,
    path: Option<PathBuf>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    templated: bool,
    #[serde(default)]
    init_core: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBundle {
    name: Option<String>,
    host: Option<String>,
    #[serde(default)]
    modules: Vec<String>,
}

/// Localization settings; the dictionary sub-cache keyed by these locales
/// survives cache invalidation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Localization {
    #[serde(default)]
    pub locales: Vec<String>,
}

/// One interface module as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub name: String,
    /// Source directory, resolved relative to the config file
    pub path: PathBuf,
    /// Always built, even without explicit inclusion
    pub required: bool,
    pub templated: bool,
    pub init_core: bool,
}

/// One lazy bundle as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    pub name: String,
    /// Interface module hosting the packed output
    pub host: String,
    /// Internal modules hidden inside the host
    pub modules: Vec<String>,
}

/// Validated build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory containing the config file; module paths resolve against it
    pub root: PathBuf,
    /// Output root (absolute)
    pub output: PathBuf,
    pub release: bool,
    pub rebuild_threshold: usize,
    pub modules: Vec<ModuleConfig>,
    pub bundles: Vec<BundleConfig>,
    pub service_urls: std::collections::BTreeMap<String, String>,
    pub localization: Localization,
}

/// Default watch-mode threshold for discarding per-file rebuild intents
pub const DEFAULT_REBUILD_THRESHOLD: usize = 20;

/// Run parameters recorded in the cache. Any difference between the recorded
/// and current parameters triggers a full cache invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub tool_version: String,
    pub release: bool,
    pub modules: Vec<String>,
    pub locales: Vec<String>,
}

impl BuildConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> KilnResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| KilnError::InvalidConfig {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let raw: RawConfig = toml::from_str(&text)?;
        Self::from_raw(raw, path)
    }

    fn from_raw(raw: RawConfig, file: &Path) -> KilnResult<Self> {
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let output = raw.output.ok_or_else(|| KilnError::MissingConfigField {
            field: "output".to_string(),
            file: file.to_path_buf(),
        })?;

        if raw.modules.is_empty() {
            return Err(KilnError::MissingConfigField {
                field: "module".to_string(),
                file: file.to_path_buf(),
            });
        }

        let mut modules = Vec::with_capacity(raw.modules.len());
        for m in raw.modules {
            let name = m.name.ok_or_else(|| KilnError::MissingConfigField {
                field: "module.name".to_string(),
                file: file.to_path_buf(),
            })?;
            let path = m.path.ok_or_else(|| KilnError::MissingConfigField {
                field: "module.path".to_string(),
                file: file.to_path_buf(),
            })?;
            modules.push(ModuleConfig {
                name,
                path: root.join(path),
                required: m.required,
                templated: m.templated,
                init_core: m.init_core,
            });
        }

        let mut bundles = Vec::with_capacity(raw.bundles.len());
        for b in raw.bundles {
            let name = b.name.ok_or_else(|| KilnError::MissingConfigField {
                field: "bundle.name".to_string(),
                file: file.to_path_buf(),
            })?;
            let host = b.host.ok_or_else(|| KilnError::MissingConfigField {
                field: "bundle.host".to_string(),
                file: file.to_path_buf(),
            })?;
            if !modules.iter().any(|m| m.name == host) {
                return Err(KilnError::InvalidConfig {
                    file: file.to_path_buf(),
                    message: format!("bundle '{name}' references unknown host module '{host}'"),
                });
            }
            bundles.push(BundleConfig {
                name,
                host,
                modules: b.modules,
            });
        }

        Ok(Self {
            output: root.join(output),
            root,
            release: raw.release,
            rebuild_threshold: raw.rebuild_threshold.unwrap_or(DEFAULT_REBUILD_THRESHOLD),
            modules,
            bundles,
            service_urls: raw.service_urls,
            localization: raw.localization,
        })
    }

    /// Parameters that affect compiled output, recorded in the cache.
    pub fn run_params(&self) -> RunParams {
        let mut modules: Vec<String> = self.modules.iter().map(|m| m.name.clone()).collect();
        modules.sort();
        RunParams {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            release: self.release,
            modules,
            locales: self.localization.locales.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("kiln.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"
required = true
"#,
        );

        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.modules.len(), 1);
        assert_eq!(config.modules[0].name, "Shell");
        assert!(config.modules[0].required);
        assert!(!config.release);
        assert_eq!(config.output, dir.path().join("build"));
        assert_eq!(config.rebuild_threshold, DEFAULT_REBUILD_THRESHOLD);
    }

    #[test]
    fn missing_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[[module]]\nname = \"A\"\npath = \"a\"\n");

        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, KilnError::MissingConfigField { ref field, .. } if field == "output"));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_module_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "output = \"build\"\n[[module]]\npath = \"a\"\n");

        let err = BuildConfig::load(&path).unwrap_err();
        assert!(
            matches!(err, KilnError::MissingConfigField { ref field, .. } if field == "module.name")
        );
    }

    #[test]
    fn bundle_with_unknown_host_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"

[[bundle]]
name = "Shell/lazy"
host = "NoSuchModule"
modules = ["Shell/_private/grid"]
"#,
        );

        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, KilnError::InvalidConfig { .. }));
    }

    #[test]
    fn run_params_sorts_module_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
output = "build"
release = true

[[module]]
name = "Zeta"
path = "z"

[[module]]
name = "Alpha"
path = "a"
"#,
        );

        let params = BuildConfig::load(&path).unwrap().run_params();
        assert_eq!(params.modules, vec!["Alpha", "Zeta"]);
        assert!(params.release);
    }
}
