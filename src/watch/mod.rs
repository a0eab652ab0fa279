//! Watch mode
//!
//! After an initial full build, file-system events are debounced into pending
//! change sets and replayed as filtered rebuilds of the owning modules. When
//! the pending set grows past the configured threshold, the per-module intent
//! is discarded and one full rebuild supersedes it. Content hashing inside
//! the build pipeline filters out touch-without-change events, so editors
//! that rewrite files in place do not trigger recompilation.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher as _};
use serde::Serialize;

use crate::config::BuildConfig;
use crate::error::{KilnError, KilnResult};
use crate::workflow::Workflow;

/// Default debounce window between the last observed change and a rebuild
pub const DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub debounce_ms: u64,
    /// Local hot-reload port pinged after each successful rebuild
    pub notify_port: Option<u16>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_MS,
            notify_port: None,
        }
    }
}

/// Watch progress events, rendered by the CLI as text or NDJSON
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    Started { modules: usize },
    Rebuilding { pending: usize },
    /// Pending set exceeded the threshold; a full rebuild supersedes
    FullRebuild { pending: usize },
    Rebuilt { errors: usize, warnings: usize },
    Stopped,
}

impl WatchEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub type WatchSink = Box<dyn Fn(&WatchEvent) + Send + Sync>;

/// Debounce accumulator: paths observed since the last rebuild, plus the time
/// of the most recent change.
#[derive(Debug, Default)]
pub struct PendingChanges {
    paths: BTreeSet<PathBuf>,
    last_change: Option<Instant>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.insert(path);
        self.last_change = Some(Instant::now());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// The set is ready once the debounce window has passed since the most
    /// recent change.
    pub fn ready(&self, now: Instant, debounce: Duration) -> bool {
        match self.last_change {
            Some(last) if !self.paths.is_empty() => now.duration_since(last) >= debounce,
            _ => false,
        }
    }

    pub fn drain(&mut self) -> BTreeSet<PathBuf> {
        self.last_change = None;
        std::mem::take(&mut self.paths)
    }
}

/// Modules whose source tree contains any of the changed paths. Paths outside
/// every configured module are dropped.
pub fn owning_modules(config: &BuildConfig, paths: &BTreeSet<PathBuf>) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    for path in paths {
        for module in &config.modules {
            if path.starts_with(&module.path) {
                modules.insert(module.name.clone());
            }
        }
    }
    modules
}

/// The watch loop. Runs until interrupted.
pub struct WatchMode<'a> {
    config: &'a BuildConfig,
    options: WatchOptions,
    events: Option<WatchSink>,
}

impl<'a> WatchMode<'a> {
    pub fn new(config: &'a BuildConfig, options: WatchOptions) -> Self {
        Self {
            config,
            options,
            events: None,
        }
    }

    pub fn with_events(mut self, sink: WatchSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Initial full build, then rebuild on debounced changes until Ctrl-C.
    pub fn run(&self) -> KilnResult<()> {
        Workflow::new(self.config).run()?;
        self.emit(WatchEvent::Started {
            modules: self.config.modules.len(),
        });

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| KilnError::Io(std::io::Error::other(e)))?;
        for module in &self.config.modules {
            watcher
                .watch(&module.path, RecursiveMode::Recursive)
                .map_err(|e| KilnError::Io(std::io::Error::other(e)))?;
        }

        let running = Arc::new(AtomicBool::new(true));
        let handler_flag = running.clone();
        ctrlc::set_handler(move || {
            handler_flag.store(false, Ordering::SeqCst);
        })
        .map_err(|e| KilnError::Io(std::io::Error::other(e)))?;

        let debounce = Duration::from_millis(self.options.debounce_ms);
        let mut pending = PendingChanges::new();

        while running.load(Ordering::SeqCst) {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(Ok(event)) => {
                    if event.kind.is_access() {
                        continue;
                    }
                    for path in event.paths {
                        pending.add(path);
                    }
                }
                Ok(Err(_)) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            if pending.ready(Instant::now(), debounce) {
                self.rebuild(&mut pending)?;
            }
        }

        self.emit(WatchEvent::Stopped);
        Ok(())
    }

    fn rebuild(&self, pending: &mut PendingChanges) -> KilnResult<()> {
        let count = pending.len();
        let paths = pending.drain();
        let workflow = Workflow::new(self.config);

        let report = if count > self.config.rebuild_threshold {
            self.emit(WatchEvent::FullRebuild { pending: count });
            workflow.run()?
        } else {
            self.emit(WatchEvent::Rebuilding { pending: count });
            let modules = owning_modules(self.config, &paths);
            if modules.is_empty() {
                return Ok(());
            }
            workflow.run_filtered(Some(&modules))?
        };

        self.emit(WatchEvent::Rebuilt {
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        });
        self.notify_reload();
        Ok(())
    }

    /// Ping the hot-reload listener, if configured. Best-effort: a dev server
    /// that is not running is not an error.
    fn notify_reload(&self) {
        let Some(port) = self.options.notify_port else {
            return;
        };
        if let Ok(mut stream) = std::net::TcpStream::connect(("127.0.0.1", port)) {
            use std::io::Write;
            let _ = stream.write_all(b"reload\n");
        }
    }

    fn emit(&self, event: WatchEvent) {
        if let Some(sink) = &self.events {
            sink(&event);
        }
    }
}
