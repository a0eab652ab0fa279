//! Compiler collaborator boundary and the typed file pipeline
//!
//! The actual template/LESS/TS compilers are external collaborators. They are
//! modeled by the [`Compiler`] trait: compile source text or fail with a
//! structured error carrying file and module context. Errors are caught at
//! the file-pipeline boundary and converted to report entries; they never
//! unwind past the per-module stage.
//!
//! Files flow through a module's stage chain as explicit [`AssetRecord`]
//! values. Each stage takes a record and returns the next record or nothing
//! (file filtered out); stages are composed by plain function chaining.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Module;

/// Structured compiler failure with file and module context for logging
#[derive(Error, Debug, Clone)]
#[error("{module}/{path}: {message}")]
pub struct CompileError {
    pub module: String,
    pub path: PathBuf,
    pub message: String,
}

/// Compiled output: development text always, release text when minification
/// is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledText {
    pub development: String,
    pub release: Option<String>,
}

/// Per-call compile metadata
#[derive(Debug, Clone, Copy)]
pub struct CompileMeta<'a> {
    pub module: &'a Module,
    pub release: bool,
}

/// Black-box compiler collaborator
pub trait Compiler: Send + Sync {
    /// Whether this compiler handles the given source path
    fn supports(&self, rel: &Path) -> bool;

    /// Compile source text, or fail with a structured per-file error
    fn compile(
        &self,
        source: &str,
        rel: &Path,
        meta: &CompileMeta<'_>,
    ) -> Result<CompiledText, CompileError>;
}

/// Compression collaborator used by the gzip stage. The default passthrough
/// stands in for the external compression utility.
pub trait Compressor: Send + Sync {
    fn compress(&self, source: &Path, dest: &Path) -> crate::error::KilnResult<()>;
}

/// Writes the sibling with the source bytes unchanged; the real compressor is
/// an external collaborator outside this crate's scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

impl Compressor for PassthroughCompressor {
    fn compress(&self, source: &Path, dest: &Path) -> crate::error::KilnResult<()> {
        let bytes = std::fs::read(source)?;
        crate::fsutil::atomic_write(dest, &bytes)
    }
}

/// Copies text through unchanged in development; release text strips blank
/// lines and indentation as a stand-in for real minification.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl PassthroughCompiler {
    fn minify(source: &str) -> String {
        source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Compiler for PassthroughCompiler {
    fn supports(&self, rel: &Path) -> bool {
        matches!(
            rel.extension().and_then(|e| e.to_str()),
            Some("js" | "html" | "css" | "less" | "tmpl")
        )
    }

    fn compile(
        &self,
        source: &str,
        _rel: &Path,
        meta: &CompileMeta<'_>,
    ) -> Result<CompiledText, CompileError> {
        Ok(CompiledText {
            development: source.to_string(),
            release: meta.release.then(|| Self::minify(source)),
        })
    }
}

/// The explicit service object replacing ambient globals: constructed once at
/// orchestrator startup, passed into every collaborator call, torn down at
/// shutdown.
pub struct RuntimeServices {
    compilers: Vec<Box<dyn Compiler>>,
    pub compressor: Box<dyn Compressor>,
}

impl RuntimeServices {
    /// Default service set: passthrough compiler and compressor collaborators.
    pub fn new() -> Self {
        Self {
            compilers: vec![Box::new(PassthroughCompiler)],
            compressor: Box::new(PassthroughCompressor),
        }
    }

    pub fn with_compiler(mut self, compiler: Box<dyn Compiler>) -> Self {
        // Later registrations take precedence over the defaults.
        self.compilers.insert(0, compiler);
        self
    }

    pub fn compiler_for(&self, rel: &Path) -> Option<&dyn Compiler> {
        self.compilers
            .iter()
            .find(|c| c.supports(rel))
            .map(Box::as_ref)
    }
}

impl Default for RuntimeServices {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable-by-convention record flowing through a module's stage chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub rel_path: PathBuf,
    pub contents: String,
    pub meta: BTreeMap<String, String>,
}

impl AssetRecord {
    pub fn new(rel_path: PathBuf, contents: String) -> Self {
        Self {
            rel_path,
            contents,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_contents(mut self, contents: String) -> Self {
        self.contents = contents;
        self
    }

    pub fn with_meta(mut self, key: &str, value: String) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }
}

/// Extract the module-qualified node name and dependency list from compiled
/// text of the form `define("Name", ["dep", ...], ...)`.
pub fn parse_define(source: &str) -> Option<(String, Vec<String>)> {
    let start = source.find("define(")? + "define(".len();
    let rest = &source[start..];
    let name = quoted_at(rest)?;

    let deps = match rest.find('[') {
        Some(open) => {
            let close = rest[open..].find(']')? + open;
            rest[open + 1..close]
                .split(',')
                .filter_map(|part| quoted_at(part.trim()))
                .collect()
        }
        None => Vec::new(),
    };
    Some((name, deps))
}

/// Parse route lines of the form `"/path/": "Module/controller"` from a
/// `*.routes.js` source.
pub fn parse_routes(source: &str) -> BTreeMap<String, String> {
    let mut routes = BTreeMap::new();
    for line in source.lines() {
        let line = line.trim().trim_end_matches(',');
        let Some((left, right)) = line.split_once(':') else {
            continue;
        };
        let (Some(url), Some(controller)) = (quoted_at(left.trim()), quoted_at(right.trim()))
        else {
            continue;
        };
        if url.starts_with('/') {
            routes.insert(url, controller);
        }
    }
    routes
}

fn quoted_at(s: &str) -> Option<String> {
    let open = s.find('"')?;
    let rest = &s[open + 1..];
    let close = rest.find('"')?;
    Some(rest[..close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;

    fn module() -> Module {
        Module::from_config(
            &ModuleConfig {
                name: "Shell".to_string(),
                path: PathBuf::from("/src/Shell"),
                required: false,
                templated: false,
                init_core: false,
            },
            Path::new("/out"),
        )
    }

    #[test]
    fn passthrough_keeps_dev_text() {
        let module = module();
        let meta = CompileMeta {
            module: &module,
            release: false,
        };
        let out = PassthroughCompiler
            .compile("var a = 1;\n", Path::new("a.js"), &meta)
            .unwrap();
        assert_eq!(out.development, "var a = 1;\n");
        assert!(out.release.is_none());
    }

    #[test]
    fn passthrough_release_strips_blank_lines() {
        let module = module();
        let meta = CompileMeta {
            module: &module,
            release: true,
        };
        let out = PassthroughCompiler
            .compile("  var a = 1;\n\n  var b = 2;\n", Path::new("a.js"), &meta)
            .unwrap();
        assert_eq!(out.release.unwrap(), "var a = 1;\nvar b = 2;");
    }

    #[test]
    fn services_pick_first_supporting_compiler() {
        let services = RuntimeServices::new();
        assert!(services.compiler_for(Path::new("a.js")).is_some());
        assert!(services.compiler_for(Path::new("a.png")).is_none());
    }

    #[test]
    fn parse_define_extracts_name_and_deps() {
        let source = r#"define("Shell/panel", ["Core/env", "Shell/_private/grid"], function () {});"#;
        let (name, deps) = parse_define(source).unwrap();
        assert_eq!(name, "Shell/panel");
        assert_eq!(deps, vec!["Core/env", "Shell/_private/grid"]);
    }

    #[test]
    fn parse_define_without_deps() {
        let (name, deps) = parse_define(r#"define("Shell/leaf")"#).unwrap();
        assert_eq!(name, "Shell/leaf");
        assert!(deps.is_empty());
    }

    #[test]
    fn parse_define_rejects_plain_source() {
        assert!(parse_define("var a = 1;").is_none());
    }

    #[test]
    fn parse_routes_extracts_url_map() {
        let source = "\"/main/\": \"Shell/pages/main\",\n\"/login/\": \"Auth/pages/login\"\nnot a route\n";
        let routes = parse_routes(source);
        assert_eq!(routes.get("/main/").map(String::as_str), Some("Shell/pages/main"));
        assert_eq!(routes.len(), 2);
    }
}
