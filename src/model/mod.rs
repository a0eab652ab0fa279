//! Core data model: modules, themes, and the contents manifest

pub mod manifest;
pub mod module;
pub mod theme;

pub use manifest::{extract_preload_urls, ContentsManifest, RouteInfo};
pub use module::Module;
pub use theme::{StyleTheme, ThemeConfig};
