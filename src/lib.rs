//! Kiln - incremental static-asset build pipeline
//!
//! Kiln compiles a multi-module web application's sources (templates, styles,
//! scripts, localization) into deployable artifacts, rebuilding only what
//! changed. A persistent content-hash cache drives change detection, a
//! cumulative dependency graph feeds lazy-bundle packing, and a reconciler
//! removes outputs whose sources disappeared.

pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod graph;
pub mod hash;
pub mod model;
pub mod pack;
pub mod reconcile;
pub mod watch;
pub mod workflow;

// Re-exports for convenience
pub use cache::{BuildCache, ChangeDetector, FileEntry, FileStatus};
pub use compiler::{CompileError, CompiledText, Compiler, Compressor, RuntimeServices};
pub use config::{BuildConfig, BundleConfig, ModuleConfig, RunParams};
pub use error::{KilnError, KilnResult};
pub use graph::{DependencyGraph, DependencyGraphBuilder, LazyBundles};
pub use hash::ContentHash;
pub use model::{ContentsManifest, Module, RouteInfo, StyleTheme};
pub use reconcile::OutputReconciler;
pub use watch::{WatchEvent, WatchMode, WatchOptions};
pub use workflow::{BuildEvent, BuildReport, Workflow};
