//! Error types for kiln
//!
//! Uses `thiserror` for library errors. Fatal errors abort the run;
//! recoverable errors become report entries and never unwind past the
//! per-module stage.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// Main error type for kiln operations
#[derive(Error, Debug)]
pub enum KilnError {
    /// Missing required field in the build configuration
    #[error("missing required field '{field}' in {file}")]
    MissingConfigField { field: String, file: PathBuf },

    /// Malformed build configuration
    #[error("invalid configuration in {file}: {message}")]
    InvalidConfig { file: PathBuf, message: String },

    /// An internal module was assigned to two lazy bundles
    #[error("module '{module}' is assigned to lazy bundle '{second}' but already belongs to '{first}'")]
    BundleConflict {
        module: String,
        first: String,
        second: String,
    },

    /// A library cannot be packed because a private dependency is unresolvable
    #[error("cannot pack library '{library}': compiled source for private dependency '{dependency}' not found")]
    PackMissingDependency { library: String, dependency: String },

    /// Another build process holds the run lock
    #[error("build lock at {path} is held by another process (pid {pid})")]
    LockHeld { pid: u32, path: PathBuf },

    /// Compiler collaborator failed for one file (recoverable, per-file)
    #[error("compile error in {module}/{path}: {message}")]
    Compile {
        module: String,
        path: PathBuf,
        message: String,
    },

    /// Theme folder name does not match its defining file's base name
    #[error("malformed multi-theme definition at {path}: folder '{folder}' does not match file base name")]
    MultiTheme { path: PathBuf, folder: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl KilnError {
    /// Whether this error aborts the whole run.
    ///
    /// Per-file compile errors and theme rejections are converted to report
    /// entries at the file-pipeline boundary and the build continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KilnError::Compile { .. } | KilnError::MultiTheme { .. }
        )
    }
}
