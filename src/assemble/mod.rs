//! Function assembly: dependency resolution and per-function output layout.

pub mod functions;
pub mod resolve;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Suffix marking an assembled function directory.
pub const FUNCTION_DIR_SUFFIX: &str = ".func";

/// Per-function configuration descriptor file name.
pub const VC_CONFIG_FILE: &str = ".vc-config.json";

/// Relative function directory for a primary asset's output path: same
/// parent structure, base name with the function suffix.
///
/// `middleware.js` → `middleware.func`, `api/hello.js` → `api/hello.func`.
pub fn function_dir_rel(output: &Path) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let dir_name = format!("{}{}", stem, FUNCTION_DIR_SUFFIX);
    match output.parent() {
        Some(parent) if parent != Path::new("") => parent.join(dir_name),
        _ => PathBuf::from(dir_name),
    }
}

/// Whether a directory name marks an assembled function directory.
pub fn is_function_dir_name(name: &OsStr) -> bool {
    name.to_string_lossy().ends_with(FUNCTION_DIR_SUFFIX)
}
