//! Build progress events
//!
//! The orchestrator reports progress through a caller-provided sink instead of
//! printing directly; the CLI renders events as text or NDJSON.

use serde::Serialize;

/// One progress event emitted during a build run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    RunStarted {
        release: bool,
        modules: usize,
    },
    Stage {
        stage: String,
    },
    /// Release-only stage observed as an identity step in development builds
    StageSkipped {
        stage: String,
    },
    CacheInvalidated,
    ModuleBuilt {
        module: String,
        compiled: usize,
        cached: usize,
    },
    /// Whole per-module pipeline short-circuited: no file changed
    ModuleSkipped {
        module: String,
    },
    StaleRemoved {
        removed: usize,
    },
    RunComplete {
        errors: usize,
        warnings: usize,
    },
}

impl BuildEvent {
    /// Serialize for NDJSON output.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Caller-provided event consumer
pub type EventSink = Box<dyn Fn(&BuildEvent) + Send + Sync>;
