//! esbuild binary resolution and invocation.
//!
//! Resolution order:
//! 1. `ESBUILD_BIN` env var (path to binary)
//! 2. Project-local install under `node_modules/.bin/esbuild`
//! 3. System PATH (`which esbuild`)

use super::{Bundler, CompileRequest};
use anyhow::{bail, Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A resolved, validated esbuild binary.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    path: PathBuf,
}

impl EsbuildBundler {
    /// Resolve esbuild for a project rooted at `work_dir`.
    pub fn discover(work_dir: &Path) -> Result<Self> {
        Ok(EsbuildBundler {
            path: find_esbuild(work_dir)?,
        })
    }

    /// Use an explicit binary path (validated).
    pub fn from_binary(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            bail!("esbuild binary does not exist: {}", path.display());
        }
        if !is_valid_binary(&path) {
            bail!(
                "esbuild path is not an executable file: {}",
                path.display()
            );
        }
        Ok(EsbuildBundler { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Bundler for EsbuildBundler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<()> {
        eprintln!("  esbuild: {}", request.input.display());

        let mut cmd = Command::new(&self.path);
        cmd.args(bundle_args(request));

        let output = cmd.output().with_context(|| {
            format!(
                "Failed to execute esbuild for '{}'",
                request.input.display()
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "esbuild failed for '{}'\n  Exit code: {}\n  stderr: {}",
                request.input.display(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        let entry = request.artifact_dir.join(request.entry_name);
        if !entry.exists() {
            bail!(
                "esbuild reported success but produced no entry at {}",
                entry.display()
            );
        }

        Ok(())
    }
}

/// Find the esbuild binary using the resolution order.
pub fn find_esbuild(work_dir: &Path) -> Result<PathBuf> {
    // 1. Check ESBUILD_BIN env var
    if let Ok(bin_path) = env::var("ESBUILD_BIN") {
        let path = PathBuf::from(&bin_path);
        if path.exists() {
            if is_valid_binary(&path) {
                return Ok(path);
            }
            bail!(
                "ESBUILD_BIN points to invalid binary: {}\n\
                 File exists but is not executable.",
                bin_path
            );
        }
        bail!("ESBUILD_BIN points to non-existent path: {}", bin_path);
    }

    // 2. Prefer the project-local install over global PATH installs.
    // This keeps the compile pinned to the version the project depends on.
    let local = work_dir.join("node_modules/.bin/esbuild");
    if is_valid_binary(&local) {
        return Ok(local);
    }

    // 3. Check system PATH as final fallback.
    if let Ok(path) = which::which("esbuild") {
        return Ok(path);
    }

    bail!(
        "Could not find esbuild.\n\n\
         Resolution order tried:\n\
         1. ESBUILD_BIN env var - not set\n\
         2. Project-local binary at {} - not found\n\
         3. System PATH - not found\n\n\
         Solutions:\n\
         - Set ESBUILD_BIN=/path/to/esbuild\n\
         - npm install esbuild in the project\n\
         - Install esbuild to PATH",
        local.display()
    )
}

/// Check that a candidate path is an executable file.
fn is_valid_binary(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => {
            if !meta.is_file() {
                return false;
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = meta.permissions().mode();
                if mode & 0o111 == 0 {
                    return false;
                }
            }
            true
        }
        Err(_) => false,
    }
}

/// Build the esbuild CLI argument list for one compile.
pub(crate) fn bundle_args(request: &CompileRequest<'_>) -> Vec<OsString> {
    let options = request.options;
    let mut args: Vec<OsString> = vec![request.input.as_os_str().to_os_string()];

    let mut outfile = OsString::from("--outfile=");
    outfile.push(request.artifact_dir.join(request.entry_name));
    args.push(outfile);

    args.push(format!("--format={}", options.format.as_flag()).into());
    args.push(format!("--target={}", options.target).into());
    args.push(format!("--platform={}", options.platform.as_flag()).into());
    args.push(format!("--tree-shaking={}", options.tree_shaking).into());

    if options.minify {
        args.push("--minify".into());
    }
    if options.sourcemap {
        args.push("--sourcemap".into());
    }
    if options.bundle {
        args.push("--bundle".into());
        for external in &options.external {
            args.push(format!("--external:{}", external).into());
        }
    }

    // BTreeMap iteration keeps --define order stable across runs.
    for (key, value) in request.merged_defines() {
        args.push(format!("--define:{}={}", key, value).into());
    }

    args
}
