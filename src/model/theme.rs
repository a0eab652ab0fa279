//! Style theme metadata
//!
//! A theme lives under `<module>/themes/<name>/<name>.less`, optionally with a
//! modifier sub-path distinguishing same-theme variants
//! (`themes/<name>/<modifier>/<name>.less`) and an optional
//! `theme.config.json` next to it carrying compatibility tags.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{KilnError, KilnResult};

/// Optional structured theme configuration (compatibility tags)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A named visual theme scoped to an interface module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTheme {
    pub module: String,
    pub name: String,
    /// Sub-path distinguishing same-theme variants (retina, compact, ...)
    pub modifier: Option<String>,
    pub config: Option<ThemeConfig>,
}

impl StyleTheme {
    /// Parse a theme definition from a module-relative source path.
    ///
    /// Returns `Ok(None)` for paths that are not theme definitions. The theme
    /// folder name must match the defining file's base name, otherwise the
    /// definition is rejected as a malformed multi-theme.
    pub fn from_source_path(module: &str, rel: &Path) -> KilnResult<Option<Self>> {
        let mut parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        if parts.first() != Some(&"themes") || parts.len() < 3 {
            return Ok(None);
        }
        let file = parts.pop().unwrap_or_default();
        let Some(base) = file.strip_suffix(".less") else {
            return Ok(None);
        };

        let folder = parts[1];
        if folder != base {
            return Err(KilnError::MultiTheme {
                path: rel.to_path_buf(),
                folder: folder.to_string(),
            });
        }

        let modifier = if parts.len() > 2 {
            Some(parts[2..].join("/"))
        } else {
            None
        };

        Ok(Some(Self {
            module: module.to_string(),
            name: base.to_string(),
            modifier,
            config: None,
        }))
    }

    pub fn with_config(mut self, config: ThemeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Accumulation key in the cache: last write per (module, theme) wins.
    pub fn cache_key(&self) -> String {
        match &self.modifier {
            Some(m) => format!("{}:{}#{}", self.module, self.name, m),
            None => format!("{}:{}", self.module, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_theme() {
        let theme = StyleTheme::from_source_path("Shell", Path::new("themes/dark/dark.less"))
            .unwrap()
            .unwrap();
        assert_eq!(theme.name, "dark");
        assert_eq!(theme.modifier, None);
        assert_eq!(theme.cache_key(), "Shell:dark");
    }

    #[test]
    fn parses_theme_with_modifier() {
        let theme =
            StyleTheme::from_source_path("Shell", Path::new("themes/dark/compact/dark.less"))
                .unwrap()
                .unwrap();
        assert_eq!(theme.name, "dark");
        assert_eq!(theme.modifier.as_deref(), Some("compact"));
        assert_eq!(theme.cache_key(), "Shell:dark#compact");
    }

    #[test]
    fn rejects_multi_theme_definition() {
        let err = StyleTheme::from_source_path("Shell", Path::new("themes/dark/light.less"))
            .unwrap_err();
        assert!(matches!(err, KilnError::MultiTheme { ref folder, .. } if folder == "dark"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn non_theme_paths_are_skipped() {
        assert!(StyleTheme::from_source_path("Shell", Path::new("panel/view.less"))
            .unwrap()
            .is_none());
        assert!(
            StyleTheme::from_source_path("Shell", Path::new("themes/dark/readme.md"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn config_attaches_tags() {
        let theme = StyleTheme {
            module: "Shell".to_string(),
            name: "dark".to_string(),
            modifier: None,
            config: None,
        }
        .with_config(ThemeConfig {
            tags: vec!["retina".to_string()],
        });
        assert_eq!(theme.config.unwrap().tags, vec!["retina"]);
    }
}
