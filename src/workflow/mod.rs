//! Build workflow orchestration
//!
//! One run is a fixed stage sequence bracketed by the run lock: load the
//! cache, invalidate it if run parameters changed, collect themes, build the
//! localization dictionary, build all modules in parallel, merge outcomes,
//! check bundles, reconcile stale outputs, save the cache, run the
//! release-only stages, and emit the joined artifacts. Release-only stages
//! are observed as skipped identity steps in development builds, so the
//! sequence is the same shape either way. The cache write-back and the report
//! are finalized even when a stage fails; the lock releases on drop.

pub mod build;
pub mod event;
pub mod lock;
pub mod report;

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::cache::BuildCache;
use crate::compiler::RuntimeServices;
use crate::config::BuildConfig;
use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use crate::graph::{detect_bundle_cycles, LazyBundles};
use crate::model::{ContentsManifest, Module, RouteInfo, StyleTheme, ThemeConfig};
use crate::pack::{pack_library, PackRequest};
use crate::reconcile::OutputReconciler;

pub use build::{build_module, min_sibling, ModuleOutcome};
pub use event::{BuildEvent, EventSink};
pub use lock::RunLock;
pub use report::{BuildReport, ReportEntry};

pub const CACHE_FILE: &str = ".kiln-cache.json";
pub const LOCK_FILE: &str = ".kiln.lock";
pub const REPORT_FILE: &str = "build-report.json";

/// Joined metadata accumulated from module outcomes, emitted as the top-level
/// artifacts at the end of the run.
#[derive(Debug, Default)]
struct JoinedMeta {
    manifest: ContentsManifest,
    /// module -> template name -> output path
    static_templates: BTreeMap<String, BTreeMap<String, String>>,
    /// module -> ordered preload URLs
    preload: BTreeMap<String, Vec<String>>,
}

/// One build run over a validated configuration.
pub struct Workflow<'a> {
    config: &'a BuildConfig,
    services: RuntimeServices,
    events: Option<EventSink>,
}

impl<'a> Workflow<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            services: RuntimeServices::new(),
            events: None,
        }
    }

    /// Replace the default collaborators (compilers, compressor).
    pub fn with_services(mut self, services: RuntimeServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Run the full build.
    pub fn run(&self) -> KilnResult<BuildReport> {
        self.run_filtered(None)
    }

    /// Run the build restricted to the named modules. Required modules are
    /// always included; cache entries of excluded modules stay valid.
    pub fn run_filtered(&self, only: Option<&BTreeSet<String>>) -> KilnResult<BuildReport> {
        self.emit(BuildEvent::RunStarted {
            release: self.config.release,
            modules: self.config.modules.len(),
        });

        let _lock = RunLock::acquire(&self.config.output.join(LOCK_FILE))?;
        let mut cache = BuildCache::load(&self.config.output.join(CACHE_FILE));
        let mut report = BuildReport::new();

        let result = self.run_stages(&mut cache, &mut report, only);
        if result.is_err() {
            // A failed stage still gets a cache write-back and a report; the
            // lock releases on drop.
            let _ = cache.save();
        }
        report.finish();
        let _ = report.save(&self.config.output.join(REPORT_FILE));
        self.emit(BuildEvent::RunComplete {
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        });

        result?;
        Ok(report)
    }

    fn run_stages(
        &self,
        cache: &mut BuildCache,
        report: &mut BuildReport,
        only: Option<&BTreeSet<String>>,
    ) -> KilnResult<()> {
        let release = self.config.release;
        let prior_outputs = cache.output_paths();

        let modules: Vec<Module> = self
            .config
            .modules
            .iter()
            .filter(|m| only.map_or(true, |set| set.contains(&m.name) || m.required))
            .map(|m| Module::from_config(m, &self.config.output))
            .collect();

        self.emit_stage("clear_cache");
        if cache.clear_if_needed(&self.config.run_params()) {
            self.emit(BuildEvent::CacheInvalidated);
        }

        self.emit_stage("collect_themes");
        self.collect_themes(cache, report, &modules);

        self.emit_stage("prepare_runtime");
        // Collaborators were constructed with the workflow; nothing to do.

        self.emit_stage("init_worker_pool");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count())
            .build()
            .map_err(|e| KilnError::Io(std::io::Error::other(e)))?;

        self.emit_stage("build_localization");
        self.build_localization(cache, report, &modules);

        self.emit_stage("build_modules");
        let cache_view: &BuildCache = cache;
        let outcomes: Vec<ModuleOutcome> = pool.install(|| {
            modules
                .par_iter()
                .map(|module| build_module(module, cache_view, &self.services, release))
                .collect()
        });

        let mut meta = JoinedMeta::default();
        let mut current_outputs: BTreeSet<String> = BTreeSet::new();
        self.merge_outcomes(cache, report, &mut meta, &mut current_outputs, outcomes);

        // Modules excluded by the filter keep their cache entries and outputs.
        let built: BTreeSet<&str> = modules.iter().map(Module::name).collect();
        for config in &self.config.modules {
            if built.contains(config.name.as_str()) {
                continue;
            }
            let rels: Vec<String> = cache
                .module_files(&config.name)
                .map(|files| files.keys().cloned().collect())
                .unwrap_or_default();
            for rel in rels {
                if let Some(entry) = cache.revalidate(&config.name, &rel) {
                    current_outputs.extend(entry.outputs.iter().cloned());
                }
            }
        }

        self.emit_stage("check_bundles");
        let mut bundles = LazyBundles::from_config(&self.config.bundles)?;
        bundles.resolve_externals(cache.graph());
        let mut cyclic: BTreeSet<String> = BTreeSet::new();
        for bundle in bundles.bundles() {
            let cycles = detect_bundle_cycles(cache.graph(), bundle);
            for cycle in &cycles.cycles {
                report.error(
                    &bundle.name,
                    None,
                    format!("lazy loading cycle: {}", cycle.join(" -> ")),
                );
            }
            if !cycles.is_empty() {
                cyclic.insert(bundle.name.clone());
            }
        }

        self.finish_manifest(cache, report, &mut meta, &modules);

        self.emit_stage("remove_stale");
        let reconciler = OutputReconciler::new(prior_outputs, current_outputs.clone());
        let removal = reconciler.remove_stale(&self.config.output);
        for (path, message) in &removal.failed {
            report.warning("reconcile", Some(&*path.to_string_lossy()), message.clone());
        }
        report.removed = removal.removed.len();
        self.emit(BuildEvent::StaleRemoved {
            removed: removal.removed.len(),
        });

        self.emit_stage("save_cache");
        cache.save()?;

        self.emit_stage("terminate_worker_pool");
        drop(pool);

        if release {
            self.emit_stage("finalize_release");
            self.finalize_release(report, &current_outputs);
            self.emit_stage("pack_html");
            self.pack_html(report, &meta);
            self.emit_stage("custom_pack");
            self.custom_pack(cache, report, &bundles, &cyclic)?;
            self.emit_stage("gzip");
            self.gzip_outputs(report, &current_outputs);
        } else {
            for stage in ["finalize_release", "pack_html", "custom_pack", "gzip"] {
                self.emit(BuildEvent::StageSkipped {
                    stage: stage.to_string(),
                });
            }
        }

        self.emit_stage("save_joined_meta");
        self.save_joined_meta(cache, &meta, &bundles)?;

        Ok(())
    }

    fn collect_themes(&self, cache: &mut BuildCache, report: &mut BuildReport, modules: &[Module]) {
        for module in modules {
            for rel in fsutil::walk_sources(module.source()) {
                let rel_str = fsutil::normalize_path(&rel);
                if !rel_str.ends_with(".less") {
                    continue;
                }
                match StyleTheme::from_source_path(module.name(), &rel) {
                    Ok(None) => {}
                    Ok(Some(theme)) => {
                        let config_path = module
                            .source()
                            .join(&rel)
                            .with_file_name("theme.config.json");
                        match read_theme_config(&config_path) {
                            Some(config) => cache.add_new_style_theme(theme.with_config(config)),
                            None => cache.add_style_theme(theme),
                        }
                    }
                    Err(e) => report.warning(module.name(), Some(rel_str.as_str()), e.to_string()),
                }
            }
            let less_config = module.source().join("less.config.json");
            if let Ok(text) = std::fs::read_to_string(&less_config) {
                match serde_json::from_str(&text) {
                    Ok(value) => cache.add_module_less_config(module.name(), value),
                    Err(e) => {
                        report.warning(module.name(), Some("less.config.json"), e.to_string())
                    }
                }
            }
        }
    }

    /// Rebuild the per-locale dictionary from `lang/<locale>.json` files. A
    /// locale with no lang files anywhere keeps its cached dictionary, which
    /// is the part that survives cache invalidation.
    fn build_localization(
        &self,
        cache: &mut BuildCache,
        report: &mut BuildReport,
        modules: &[Module],
    ) {
        for locale in &self.config.localization.locales {
            let mut keys: BTreeSet<String> = BTreeSet::new();
            let mut found = false;
            for module in modules {
                let path = module.source().join("lang").join(format!("{locale}.json"));
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                found = true;
                match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text) {
                    Ok(map) => {
                        for key in map.keys() {
                            keys.insert(format!("{}.{}", module.name(), key));
                        }
                    }
                    Err(e) => report.warning(
                        module.name(),
                        Some(format!("lang/{locale}.json").as_str()),
                        e.to_string(),
                    ),
                }
            }
            if found || cache.dictionary(locale).is_none() {
                cache.set_dictionary(locale, keys);
            }
        }
    }

    fn merge_outcomes(
        &self,
        cache: &mut BuildCache,
        report: &mut BuildReport,
        meta: &mut JoinedMeta,
        current_outputs: &mut BTreeSet<String>,
        outcomes: Vec<ModuleOutcome>,
    ) {
        for outcome in outcomes {
            if outcome.skipped {
                report.modules_skipped += 1;
                self.emit(BuildEvent::ModuleSkipped {
                    module: outcome.module.clone(),
                });
            } else {
                report.modules_built += 1;
                self.emit(BuildEvent::ModuleBuilt {
                    module: outcome.module.clone(),
                    compiled: outcome.compiled,
                    cached: outcome.cached,
                });
            }
            report.compiled += outcome.compiled;
            report.cached += outcome.cached;
            for entry in outcome.errors {
                report.push_error(entry);
            }
            for entry in outcome.warnings {
                report.push_warning(entry);
            }

            for rel in &outcome.revalidated {
                cache.revalidate(&outcome.module, rel);
            }
            for (rel, entry) in outcome.records {
                if let Some(node) = &entry.node {
                    let path = entry
                        .outputs
                        .first()
                        .cloned()
                        .unwrap_or_else(|| rel.clone());
                    cache.graph_mut().merge(node, &path, &entry.deps);
                }
                cache.record_file(&outcome.module, &rel, entry);
            }
            for rel in &outcome.deleted {
                if let Some(node) = cache
                    .file(&outcome.module, rel)
                    .and_then(|e| e.node.clone())
                {
                    cache.graph_mut().remove(&node);
                }
            }

            current_outputs.extend(outcome.confirmed);
            for (url, controller) in outcome.routes {
                meta.manifest.routes.insert(url, RouteInfo { controller });
            }
            if !outcome.static_templates.is_empty() {
                meta.static_templates
                    .entry(outcome.module.clone())
                    .or_default()
                    .extend(outcome.static_templates);
            }
            if !outcome.preload.is_empty() {
                meta.preload
                    .entry(outcome.module.clone())
                    .or_default()
                    .extend(outcome.preload);
            }
        }
    }

    /// Fill in the graph-dependent manifest parts and warn about unresolved
    /// dependencies reachable from the entry points.
    fn finish_manifest(
        &self,
        cache: &BuildCache,
        report: &mut BuildReport,
        meta: &mut JoinedMeta,
        modules: &[Module],
    ) {
        for config in &self.config.modules {
            meta.manifest
                .modules
                .insert(config.name.clone(), config.name.clone());
        }

        let mut entry_points = Vec::new();
        for module in modules {
            let qualified = format!("{0}/{0}", module.name());
            if cache.graph().contains(&qualified) {
                meta.manifest
                    .js_entries
                    .insert(module.name().to_string(), qualified.clone());
                entry_points.push(qualified);
            }
        }
        for missing in cache.graph().unresolved_from(&entry_points) {
            report.warning(
                "graph",
                None,
                format!("unresolved dependency '{missing}' reachable from an entry point"),
            );
        }

        meta.manifest.dictionary = cache.dictionary_keys();
        meta.manifest.service_urls = self.config.service_urls.clone();
    }

    /// Ensure every compilable output has a minified sibling; files carried
    /// over from a development cache get a passthrough copy.
    fn finalize_release(&self, report: &mut BuildReport, current_outputs: &BTreeSet<String>) {
        for rel in current_outputs {
            if is_min_output(rel) {
                continue;
            }
            let Some(min) = min_sibling(rel) else { continue };
            let min_path = self.config.output.join(&min);
            if min_path.exists() {
                continue;
            }
            let dev_path = self.config.output.join(rel);
            let result = std::fs::read(&dev_path).and_then(|bytes| {
                fsutil::atomic_write(&min_path, &bytes).map_err(std::io::Error::other)
            });
            if let Err(e) = result {
                report.warning("finalize", Some(rel.as_str()), e.to_string());
            }
        }
    }

    /// Mark packaged static templates. Idempotent: already-marked templates
    /// are left alone.
    fn pack_html(&self, report: &mut BuildReport, meta: &JoinedMeta) {
        const HTML_MARKER: &str = "<!-- packed by kiln -->";
        for templates in meta.static_templates.values() {
            for rel in templates.values() {
                let path = self.config.output.join(rel);
                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) => {
                        report.warning("pack_html", Some(rel.as_str()), e.to_string());
                        continue;
                    }
                };
                if text.starts_with(HTML_MARKER) {
                    continue;
                }
                let marked = format!("{HTML_MARKER}\n{text}");
                if let Err(e) = fsutil::atomic_write(&path, marked.as_bytes()) {
                    report.warning("pack_html", Some(rel.as_str()), e.to_string());
                }
            }
        }
    }

    /// Pack each lazy bundle into its host library output. Bundles with a
    /// detected cycle were already reported and are skipped; a missing private
    /// source is fatal.
    fn custom_pack(
        &self,
        cache: &BuildCache,
        report: &mut BuildReport,
        bundles: &LazyBundles,
        cyclic: &BTreeSet<String>,
    ) -> KilnResult<()> {
        for bundle in bundles.bundles() {
            if cyclic.contains(&bundle.name) {
                continue;
            }
            let Some(library_path) = cache.graph().node_path(&bundle.name) else {
                report.error(
                    &bundle.name,
                    None,
                    "bundle library was not built; nothing to pack",
                );
                continue;
            };
            let library_abs = self.config.output.join(library_path);
            let source = std::fs::read_to_string(&library_abs)?;

            let mut sources: BTreeMap<String, String> = BTreeMap::new();
            for module in &bundle.modules {
                let Some(path) = cache.graph().node_path(module) else {
                    continue;
                };
                if let Ok(text) = std::fs::read_to_string(self.config.output.join(path)) {
                    sources.insert(module.clone(), text);
                }
            }

            let packed = pack_library(&PackRequest {
                library: &bundle.name,
                source: &source,
                packable: &bundle.modules,
                sources: &sources,
                graph: cache.graph(),
            })?;
            fsutil::atomic_write(&library_abs, packed.as_bytes())?;
            if let Some(min) = min_sibling(library_path) {
                fsutil::atomic_write(&self.config.output.join(min), packed.as_bytes())?;
            }
        }
        Ok(())
    }

    fn gzip_outputs(&self, report: &mut BuildReport, current_outputs: &BTreeSet<String>) {
        for rel in current_outputs {
            if !matches!(
                rel.rsplit_once('.').map(|(_, ext)| ext),
                Some("css" | "js" | "html")
            ) {
                continue;
            }
            let source = self.config.output.join(rel);
            let dest = self.config.output.join(format!("{rel}.gz"));
            if let Err(e) = self.services.compressor.compress(&source, &dest) {
                report.warning("gzip", Some(rel.as_str()), e.to_string());
            }
        }
    }

    /// Emit the joined top-level artifacts and their per-module splits.
    fn save_joined_meta(
        &self,
        cache: &BuildCache,
        meta: &JoinedMeta,
        bundles: &LazyBundles,
    ) -> KilnResult<()> {
        let out = &self.config.output;

        let graph = cache.module_dependencies();
        write_json(&out.join("module-dependencies.json"), &graph)?;
        write_json(&out.join("routes-info.json"), &meta.manifest.routes)?;
        write_json(&out.join("preload_urls.json"), &meta.preload)?;
        write_json(&out.join("static_templates.json"), &meta.static_templates)?;
        write_json(&out.join("lazy-bundles.json"), &bundles.definitions())?;
        write_json(&out.join("lazy-bundles-map.json"), bundles.to_map())?;

        write_json(&out.join("contents.json"), &meta.manifest)?;
        fsutil::atomic_write(
            &out.join("contents.js"),
            meta.manifest.to_contents_js().as_bytes(),
        )?;

        for config in &self.config.modules {
            let shard = meta.manifest.split_for(&config.name);
            let dir = out.join(&config.name);
            write_json(&dir.join("contents.json"), &shard)?;
            fsutil::atomic_write(&dir.join("contents.js"), shard.to_contents_js().as_bytes())?;
            write_json(&dir.join("routes-info.json"), &shard.routes)?;
            write_json(
                &dir.join("module-dependencies.json"),
                &graph.split_for(&config.name),
            )?;
        }
        Ok(())
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(sink) = &self.events {
            sink(&event);
        }
    }

    fn emit_stage(&self, stage: &str) {
        self.emit(BuildEvent::Stage {
            stage: stage.to_string(),
        });
    }
}

fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> KilnResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fsutil::atomic_write(path, &json)
}

fn read_theme_config(path: &std::path::Path) -> Option<ThemeConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn is_min_output(rel: &str) -> bool {
    ["js", "css", "html"]
        .iter()
        .any(|ext| rel.ends_with(&format!(".min.{ext}")))
}

/// Leave one core for the watcher and the OS, never less than one worker.
fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}
