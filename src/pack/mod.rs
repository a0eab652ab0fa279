//! Library packing
//!
//! Packs a library's private dependencies into a single output unit. Every
//! private dependency reachable only from within the library becomes a
//! locally-scoped, lazily-initialized factory: first access triggers
//! evaluation, the result is memoized. The library's own exports that resolve
//! to private dependencies stay lazy from the consumer's perspective through
//! property getters, so importing the library does not force evaluation of
//! untouched code paths. References to modules outside the packable set are
//! left as runtime-resolved lookups.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{KilnError, KilnResult};
use crate::graph::DependencyGraphBuilder;

/// First line of every packed output; re-running the packer on its own
/// output detects the marker and skips re-processing.
pub const PACKED_MARKER: &str = "/* packed by kiln */";

/// One library packing request
pub struct PackRequest<'a> {
    /// Module-qualified library name
    pub library: &'a str,
    /// The library's compiled output
    pub source: &'a str,
    /// Private module names eligible for inlining
    pub packable: &'a BTreeSet<String>,
    /// Compiled text per private module
    pub sources: &'a BTreeMap<String, String>,
    pub graph: &'a DependencyGraphBuilder,
}

/// Pack one library. A private dependency whose compiled source cannot be
/// located is fatal: the library cannot be correctly packed partially.
pub fn pack_library(req: &PackRequest<'_>) -> KilnResult<String> {
    if req.source.starts_with(PACKED_MARKER) {
        return Ok(req.source.to_string());
    }

    let reachable = reachable_private(req);
    let mut out = String::new();
    out.push_str(PACKED_MARKER);
    out.push_str("\n(function () {\n\"use strict\";\n");
    out.push_str("var factories = {};\nvar cells = {};\n");
    out.push_str(
        "function lazy(name) { if (!(name in cells)) { cells[name] = factories[name](); } return cells[name]; }\n",
    );

    for name in &reachable {
        let source = req.sources.get(name).ok_or_else(|| {
            KilnError::PackMissingDependency {
                library: req.library.to_string(),
                dependency: name.clone(),
            }
        })?;
        out.push_str(&format!("factories[{name:?}] = function () {{\n"));
        out.push_str("var exports = {};\n");
        out.push_str(&rewrite_requires(source, &reachable));
        out.push_str("\nreturn exports;\n};\n");
    }

    let body = lazify_exports(req.source, &reachable);
    out.push_str(&rewrite_requires(&body, &reachable));
    out.push_str("\n}());\n");
    Ok(out)
}

/// Private dependencies reachable from the library, restricted to the
/// packable set. Walks the merged graph breadth-first.
fn reachable_private(req: &PackRequest<'_>) -> BTreeSet<String> {
    let mut reachable = BTreeSet::new();
    let mut queue: VecDeque<&str> = req
        .graph
        .deps_of(req.library)
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();

    while let Some(name) = queue.pop_front() {
        if !req.packable.contains(name) || !reachable.insert(name.to_string()) {
            continue;
        }
        if let Some(deps) = req.graph.deps_of(name) {
            for dep in deps {
                queue.push_back(dep);
            }
        }
    }
    reachable
}

/// Rewrite `require("Name")` to the memoized local factory call for every
/// inlined name. Requires of modules outside the packable set stay as
/// runtime-resolved lookups.
fn rewrite_requires(source: &str, inlined: &BTreeSet<String>) -> String {
    let mut text = source.to_string();
    for name in inlined {
        let from = format!("require({name:?})");
        let to = format!("lazy({name:?})");
        text = text.replace(&from, &to);
    }
    text
}

/// Turn `exports.name = require("Private")` assignments into property
/// getters so the consumer's first access, not the import, triggers the
/// factory.
fn lazify_exports(source: &str, inlined: &BTreeSet<String>) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            let Some(rest) = trimmed.strip_prefix("exports.") else {
                return line.to_string();
            };
            let Some((export, value)) = rest.split_once('=') else {
                return line.to_string();
            };
            let value = value.trim().trim_end_matches(';');
            let Some(required) = value
                .strip_prefix("require(\"")
                .and_then(|v| v.strip_suffix("\")"))
            else {
                return line.to_string();
            };
            if !inlined.contains(required) {
                return line.to_string();
            }
            format!(
                "Object.defineProperty(exports, {:?}, {{ get: function () {{ return lazy({:?}); }} }});",
                export.trim(),
                required
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
