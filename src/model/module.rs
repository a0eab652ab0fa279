//! Interface module entity

use std::path::{Path, PathBuf};

use crate::config::ModuleConfig;

/// One interface/library unit of the application.
///
/// Created once from configuration at workflow start; immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    source: PathBuf,
    output: PathBuf,
    required: bool,
    templated: bool,
    init_core: bool,
}

impl Module {
    pub fn from_config(config: &ModuleConfig, output_root: &Path) -> Self {
        Self {
            name: config.name.clone(),
            source: config.path.clone(),
            output: output_root.join(&config.name),
            required: config.required,
            templated: config.templated,
            init_core: config.init_core,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source directory of the module
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Output root for this module's compiled artifacts
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Required modules are always built, even without explicit inclusion
    pub fn required(&self) -> bool {
        self.required
    }

    pub fn templated(&self) -> bool {
        self.templated
    }

    pub fn init_core(&self) -> bool {
        self.init_core
    }

    /// Owning module of a module-qualified name such as `Shell/_private/grid`.
    pub fn owner_of(qualified: &str) -> &str {
        qualified.split('/').next().unwrap_or(qualified)
    }

    /// Owning module of a dictionary key such as `Shell.menu.title`.
    pub fn owner_of_key(key: &str) -> &str {
        key.split('.').next().unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_derives_output_path() {
        let config = ModuleConfig {
            name: "Shell".to_string(),
            path: PathBuf::from("/src/Shell"),
            required: true,
            templated: false,
            init_core: false,
        };
        let module = Module::from_config(&config, Path::new("/out"));
        assert_eq!(module.output(), Path::new("/out/Shell"));
        assert!(module.required());
    }

    #[test]
    fn owner_of_qualified_name() {
        assert_eq!(Module::owner_of("Shell/_private/grid"), "Shell");
        assert_eq!(Module::owner_of("Shell"), "Shell");
    }

    #[test]
    fn owner_of_dictionary_key() {
        assert_eq!(Module::owner_of_key("Shell.menu.title"), "Shell");
    }
}
