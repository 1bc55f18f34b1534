//! Staged build pipeline: the run driver, per-extension orchestration,
//! and the scratch-directory plumbing they share.

pub mod driver;
pub(crate) mod extension_build;
pub mod paths;
pub mod scratch;

use std::path::{Path, PathBuf};

/// Environment variable overriding the extension sources root.
pub const EXTENSIONS_ROOT_ENV: &str = "DEPLOY_BUILDER_EXTENSIONS";

/// Default extension sources directory under the working directory.
pub const DEFAULT_EXTENSIONS_DIR: &str = "extensions";

/// Resolve the extension sources root for `work_dir`, honoring the
/// environment override.
pub fn resolve_extensions_root(work_dir: &Path) -> PathBuf {
    match std::env::var(EXTENSIONS_ROOT_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => work_dir.join(DEFAULT_EXTENSIONS_DIR),
    }
}
