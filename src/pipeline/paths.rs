//! Canonical on-disk locations for one run.
//!
//! Everything the pipeline creates lives under the platform directory at
//! the working-directory root: the output tree the platform consumes and
//! the scratch root that exists only while a run is in flight.

use std::path::{Path, PathBuf};

/// Platform directory at the working-directory root.
pub const PLATFORM_DIR: &str = ".vercel";
/// Output tree root inside the platform directory.
pub const OUTPUT_DIR: &str = "output";
/// Static-assets subtree inside the output root.
pub const STATIC_DIR: &str = "static";
/// Functions subtree inside the output root.
pub const FUNCTIONS_DIR: &str = "functions";
/// Top-level routing manifest file name.
pub const ROUTES_MANIFEST_FILE: &str = "config.json";
/// Run-scoped scratch root inside the platform directory.
pub const SCRATCH_DIR: &str = "build-tmp";
/// Advisory lock file name inside the platform directory.
pub const RUN_LOCK_FILE: &str = ".build-lock";

/// All canonical paths for a run rooted at one working directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub work_dir: PathBuf,
    pub platform_dir: PathBuf,
    pub output_root: PathBuf,
    pub static_root: PathBuf,
    pub functions_root: PathBuf,
    pub routes_manifest: PathBuf,
    pub scratch_root: PathBuf,
    pub run_lock: PathBuf,
}

impl RunPaths {
    pub fn new(work_dir: &Path) -> Self {
        let platform_dir = work_dir.join(PLATFORM_DIR);
        let output_root = platform_dir.join(OUTPUT_DIR);
        RunPaths {
            work_dir: work_dir.to_path_buf(),
            static_root: output_root.join(STATIC_DIR),
            functions_root: output_root.join(FUNCTIONS_DIR),
            routes_manifest: output_root.join(ROUTES_MANIFEST_FILE),
            scratch_root: platform_dir.join(SCRATCH_DIR),
            run_lock: platform_dir.join(RUN_LOCK_FILE),
            output_root,
            platform_dir,
        }
    }

    /// Per-extension build scratch area (compiled artifacts).
    pub fn extension_build_dir(&self, extension: &str) -> PathBuf {
        self.scratch_root.join(format!("{extension}-build"))
    }

    /// Per-extension staged output area (assembled functions).
    pub fn extension_output_dir(&self, extension: &str) -> PathBuf {
        self.scratch_root.join(format!("{extension}-output"))
    }
}
