//! Per-module build pipeline
//!
//! One module's files flow through an explicit stage chain (compile, annotate,
//! write). The pipeline runs against a read-only cache view and collects all
//! of its effects into a [`ModuleOutcome`]; the orchestrator merges outcomes
//! into the cache sequentially after the parallel phase joins, so no stage
//! ever takes a lock.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::cache::{BuildCache, ChangeDetector, FileEntry, FileStatus};
use crate::compiler::{
    parse_define, parse_routes, AssetRecord, CompileMeta, RuntimeServices,
};
use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use crate::hash::ContentHash;
use crate::model::{extract_preload_urls, Module};

use super::report::ReportEntry;

/// Everything one module's pipeline produced, merged into the cache by the
/// orchestrator after the parallel phase joins.
#[derive(Debug, Default)]
pub struct ModuleOutcome {
    pub module: String,
    /// Whole pipeline short-circuited: every file hashed unchanged
    pub skipped: bool,
    /// Freshly compiled entries to record, in deterministic walk order
    pub records: Vec<(String, FileEntry)>,
    /// Unchanged files whose prior entries stay valid
    pub revalidated: Vec<String>,
    /// Cached files no longer present on disk
    pub deleted: Vec<String>,
    /// Output paths (output-root relative) confirmed valid this run
    pub confirmed: Vec<String>,
    pub routes: BTreeMap<String, String>,
    /// Template name -> output path
    pub static_templates: BTreeMap<String, String>,
    pub preload: Vec<String>,
    pub errors: Vec<ReportEntry>,
    pub warnings: Vec<ReportEntry>,
    pub compiled: usize,
    pub cached: usize,
}

impl ModuleOutcome {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Self::default()
        }
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ReportEntry {
            module: self.module.clone(),
            path: Some(path.to_string()),
            message: message.into(),
        });
    }
}

struct SourceFile {
    rel: PathBuf,
    rel_str: String,
    bytes: Vec<u8>,
    hash: ContentHash,
    mtime: Option<u64>,
}

/// Mutable context threaded through one file's stage chain
struct FileCx<'a> {
    module: &'a Module,
    services: &'a RuntimeServices,
    release: bool,
    rel: String,
    out_rel: String,
    /// Output path qualified with the module name, output-root relative
    qualified: String,
    entry: FileEntry,
    release_text: Option<String>,
    routes: BTreeMap<String, String>,
    static_template: Option<(String, String)>,
    preload: Vec<String>,
}

type Stage = fn(AssetRecord, &mut FileCx<'_>) -> KilnResult<Option<AssetRecord>>;

/// The per-file stage chain, in order. A stage returning `None` filters the
/// file out; an error excludes the file and becomes a report entry.
const STAGES: &[Stage] = &[stage_compile, stage_annotate, stage_write];

/// Source-relative path of a file's primary output.
pub fn output_rel(rel: &str) -> String {
    match rel.strip_suffix(".less") {
        Some(stem) => format!("{stem}.css"),
        None => rel.to_string(),
    }
}

/// Minified sibling path for outputs that have one.
pub fn min_sibling(rel: &str) -> Option<String> {
    let (stem, ext) = rel.rsplit_once('.')?;
    matches!(ext, "css" | "js" | "html").then(|| format!("{stem}.min.{ext}"))
}

/// Run one module's pipeline. Never returns an error: per-file failures are
/// collected as report entries and the rest of the module still builds.
pub fn build_module(
    module: &Module,
    cache: &BuildCache,
    services: &RuntimeServices,
    release: bool,
) -> ModuleOutcome {
    let mut outcome = ModuleOutcome::new(module.name());
    let detector = ChangeDetector::new(cache);

    let mut sources = Vec::new();
    let mut walked = BTreeSet::new();
    let mut walked_hashes = BTreeMap::new();
    for rel in fsutil::walk_sources(module.source()) {
        let abs = module.source().join(&rel);
        let rel_str = fsutil::normalize_path(&rel);
        match std::fs::read(&abs) {
            Ok(bytes) => {
                let hash = ContentHash::from_bytes(&bytes);
                walked.insert(rel_str.clone());
                walked_hashes.insert(rel_str.clone(), hash.clone());
                sources.push(SourceFile {
                    mtime: fsutil::mtime_secs(&abs),
                    rel,
                    rel_str,
                    bytes,
                    hash,
                });
            }
            Err(e) => outcome.error(&rel_str, e.to_string()),
        }
    }

    if outcome.errors.is_empty() && detector.module_unchanged(module.name(), &walked_hashes) {
        outcome.skipped = true;
        if let Some(files) = cache.module_files(module.name()) {
            for (rel, entry) in files {
                outcome.revalidated.push(rel.clone());
                outcome.confirmed.extend(entry.outputs.iter().cloned());
                outcome.routes.extend(entry.routes.clone());
                outcome.cached += 1;
            }
        }
        for source in &sources {
            note_static(&mut outcome, module, &source.rel_str, &source.bytes);
        }
        return outcome;
    }

    for source in sources {
        match detector.classify(module.name(), &source.rel_str, &source.hash) {
            FileStatus::Unchanged => {
                outcome.revalidated.push(source.rel_str.clone());
                if let Some(entry) = cache.file(module.name(), &source.rel_str) {
                    outcome.confirmed.extend(entry.outputs.iter().cloned());
                    outcome.routes.extend(entry.routes.clone());
                }
                note_static(&mut outcome, module, &source.rel_str, &source.bytes);
                outcome.cached += 1;
            }
            _ => process_source(&mut outcome, module, services, release, source),
        }
    }

    outcome.deleted = detector.detect_deleted(module.name(), &walked);
    outcome
}

fn process_source(
    outcome: &mut ModuleOutcome,
    module: &Module,
    services: &RuntimeServices,
    release: bool,
    source: SourceFile,
) {
    let text = match String::from_utf8(source.bytes) {
        Ok(text) => text,
        Err(e) => {
            // Binary asset: copied through verbatim, still hash-tracked.
            copy_raw(outcome, module, &source.rel_str, e.as_bytes(), source.hash, source.mtime);
            return;
        }
    };

    let out_rel = output_rel(&source.rel_str);
    let mut cx = FileCx {
        module,
        services,
        release,
        qualified: format!("{}/{}", module.name(), out_rel),
        rel: source.rel_str,
        out_rel,
        entry: FileEntry::new(source.hash, source.mtime),
        release_text: None,
        routes: BTreeMap::new(),
        static_template: None,
        preload: Vec::new(),
    };

    let mut record = Some(AssetRecord::new(source.rel, text));
    for stage in STAGES {
        let Some(current) = record.take() else { break };
        match stage(current, &mut cx) {
            Ok(next) => record = next,
            Err(e) => {
                outcome.error(&cx.rel, e.to_string());
                return;
            }
        }
    }

    outcome.compiled += 1;
    outcome.confirmed.extend(cx.entry.outputs.iter().cloned());
    outcome.routes.extend(cx.routes);
    if let Some((name, path)) = cx.static_template {
        outcome.static_templates.insert(name, path);
    }
    outcome.preload.extend(cx.preload);
    outcome.records.push((cx.rel, cx.entry));
}

fn copy_raw(
    outcome: &mut ModuleOutcome,
    module: &Module,
    rel_str: &str,
    bytes: &[u8],
    hash: ContentHash,
    mtime: Option<u64>,
) {
    let dest = module.output().join(rel_str);
    if let Err(e) = fsutil::atomic_write(&dest, bytes) {
        outcome.error(rel_str, e.to_string());
        return;
    }
    let qualified = format!("{}/{}", module.name(), rel_str);
    let mut entry = FileEntry::new(hash, mtime);
    entry.outputs.push(qualified.clone());
    outcome.confirmed.push(qualified);
    outcome.records.push((rel_str.to_string(), entry));
    outcome.compiled += 1;
}

/// Record static-template and preload metadata that does not require
/// compilation, so cached files still contribute to the joined artifacts.
fn note_static(outcome: &mut ModuleOutcome, module: &Module, rel_str: &str, bytes: &[u8]) {
    if let Some(name) = rel_str.strip_suffix(".html") {
        outcome
            .static_templates
            .insert(name.to_string(), format!("{}/{}", module.name(), rel_str));
    }
    if rel_str == "module.descr" || rel_str.ends_with("/module.descr") {
        let text = String::from_utf8_lossy(bytes);
        outcome.preload.extend(extract_preload_urls(&text));
    }
}

fn stage_compile(record: AssetRecord, cx: &mut FileCx<'_>) -> KilnResult<Option<AssetRecord>> {
    let Some(compiler) = cx.services.compiler_for(&record.rel_path) else {
        // No compiler claims the file; it passes through as a plain asset.
        return Ok(Some(record));
    };
    let meta = CompileMeta {
        module: cx.module,
        release: cx.release,
    };
    let compiled = compiler
        .compile(&record.contents, &record.rel_path, &meta)
        .map_err(|e| KilnError::Compile {
            module: e.module,
            path: e.path,
            message: e.message,
        })?;
    cx.release_text = compiled.release;
    Ok(Some(record.with_contents(compiled.development)))
}

fn stage_annotate(record: AssetRecord, cx: &mut FileCx<'_>) -> KilnResult<Option<AssetRecord>> {
    let file_name = record
        .rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if cx.rel.ends_with(".js") {
        if let Some((name, deps)) = parse_define(&record.contents) {
            cx.entry.node = Some(name);
            cx.entry.deps = deps;
        }
        if file_name.ends_with(".routes.js") {
            let routes = parse_routes(&record.contents);
            cx.entry.routes = routes.clone();
            cx.routes.extend(routes);
        }
    } else if let Some(name) = cx.rel.strip_suffix(".html") {
        cx.static_template = Some((name.to_string(), cx.qualified.clone()));
    }

    if file_name == "module.descr" {
        cx.preload = extract_preload_urls(&record.contents);
    }
    Ok(Some(record))
}

fn stage_write(record: AssetRecord, cx: &mut FileCx<'_>) -> KilnResult<Option<AssetRecord>> {
    let dest = cx.module.output().join(&cx.out_rel);
    fsutil::atomic_write(&dest, record.contents.as_bytes())?;
    cx.entry.outputs.push(cx.qualified.clone());

    if let Some(release_text) = cx.release_text.take() {
        if let Some(min) = min_sibling(&cx.out_rel) {
            fsutil::atomic_write(&cx.module.output().join(&min), release_text.as_bytes())?;
            cx.entry.outputs.push(format!("{}/{}", cx.module.name(), min));
        }
    }
    Ok(Some(record))
}
