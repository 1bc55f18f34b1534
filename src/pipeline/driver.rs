//! Staged run driver.
//!
//! Stages, each gated on the previous one:
//!
//! 1. validate every input: run config, static source directory, every
//!    enabled extension manifest
//! 2. create a clean output root and scratch root under the platform
//!    directory, guarded by the run lock
//! 3. copy static assets into `static/`
//! 4. build each enabled extension in declaration order
//! 5. merge the staged function trees into `functions/`
//! 6. write the routing manifest
//!
//! The scratch root is removed on every exit path. The output root
//! survives only a fully successful run, so observers never see a
//! half-written tree; a failure during stage 1 creates nothing at all.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::functions::merge_function_trees;
use crate::compiler::Bundler;
use crate::config::RunConfig;
use crate::fsops::{copy_tree_no_clobber, tree_digest};
use crate::manifest::{load_extension_manifest, ExtensionManifest};
use crate::pipeline::extension_build::build_extension;
use crate::pipeline::paths::RunPaths;
use crate::pipeline::scratch::{RunLock, ScratchDir};

/// Routing manifest written to the output root: route every request
/// through the middleware first, then fall back to the filesystem.
const ROUTES_MANIFEST: &str = r#"{
  "version": 3,
  "routes": [
    { "src": "/(.*)", "middlewarePath": "middleware", "continue": true },
    { "handle": "filesystem" }
  ]
}
"#;

/// Everything a run needs, resolved once by the caller.
#[derive(Debug)]
pub struct RunContext {
    pub work_dir: PathBuf,
    pub extensions_root: PathBuf,
    pub config: RunConfig,
}

impl RunContext {
    pub fn new(work_dir: PathBuf, extensions_root: PathBuf, config: RunConfig) -> Self {
        RunContext {
            work_dir,
            extensions_root,
            config,
        }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub output_root: PathBuf,
    pub extensions: usize,
    pub functions: usize,
    /// Content digest of the finished output tree.
    pub tree_digest: String,
}

/// One extension ready to build: validated manifest plus its
/// compile-time substitutions.
struct ExtensionPlan {
    manifest: ExtensionManifest,
    substitutions: BTreeMap<String, String>,
}

/// Run the whole pipeline for `ctx`.
pub fn run(ctx: &RunContext, bundler: &dyn Bundler) -> Result<RunSummary> {
    let paths = RunPaths::new(&ctx.work_dir);

    // Stage 1: validate everything up front so a bad input has zero side
    // effects, not even an empty platform directory.
    ctx.config.validate()?;
    let static_src = ctx.work_dir.join(&ctx.config.static_directory);
    if !static_src.is_dir() {
        bail!(
            "static source directory '{}' does not exist; build the site first",
            static_src.display()
        );
    }
    let mut plans = Vec::with_capacity(ctx.config.extensions.len());
    for (name, section) in &ctx.config.extensions {
        let manifest = load_extension_manifest(name, &ctx.extensions_root.join(name))?;
        plans.push(ExtensionPlan {
            substitutions: section.substitutions(name),
            manifest,
        });
    }

    let platform_existed = paths.platform_dir.is_dir();
    let outcome = run_staged(&paths, &static_src, &plans, bundler);
    if outcome.is_err() && !platform_existed {
        // This run created the platform directory; a failed run leaves no
        // trace of it either. Only removable once empty, which the scratch
        // and output guards have already arranged.
        let _ = fs::remove_dir(&paths.platform_dir);
    }
    outcome
}

fn run_staged(
    paths: &RunPaths,
    static_src: &Path,
    plans: &[ExtensionPlan],
    bundler: &dyn Bundler,
) -> Result<RunSummary> {
    // Stage 2. The lock is declared before the directory guards so it is
    // dropped, and its file removed, after both of them.
    fs::create_dir_all(&paths.platform_dir).with_context(|| {
        format!(
            "creating platform directory '{}'",
            paths.platform_dir.display()
        )
    })?;
    let _lock = RunLock::acquire(&paths.run_lock)?;
    let output_guard = ScratchDir::create_clean(paths.output_root.clone())?;
    let scratch_guard = ScratchDir::create_clean(paths.scratch_root.clone())?;

    let staged = (|| -> Result<RunSummary> {
        // Stage 3
        println!(
            "[deploy] copying static assets from '{}'",
            static_src.display()
        );
        copy_tree_no_clobber(static_src, &paths.static_root)
            .with_context(|| format!("copying static assets from '{}'", static_src.display()))?;

        // Stage 4
        let mut staged_outputs = Vec::with_capacity(plans.len());
        let mut functions = 0usize;
        for plan in plans {
            let staged_output =
                build_extension(&plan.manifest, &plan.substitutions, bundler, paths)?;
            functions += plan.manifest.functions.len();
            staged_outputs.push((plan.manifest.name.clone(), staged_output));
        }

        // Stage 5
        fs::create_dir_all(&paths.functions_root).with_context(|| {
            format!(
                "creating functions directory '{}'",
                paths.functions_root.display()
            )
        })?;
        for (name, staged_output) in &staged_outputs {
            merge_function_trees(staged_output, &paths.functions_root)
                .with_context(|| format!("merging functions from extension '{name}'"))?;
        }

        // Stage 6
        fs::write(&paths.routes_manifest, ROUTES_MANIFEST).with_context(|| {
            format!(
                "writing routing manifest '{}'",
                paths.routes_manifest.display()
            )
        })?;

        let digest = tree_digest(&paths.output_root)?;
        Ok(RunSummary {
            output_root: paths.output_root.clone(),
            extensions: plans.len(),
            functions,
            tree_digest: digest,
        })
    })();

    // Scratch contents go away on every path; the output root survives
    // only a successful run.
    scratch_guard.remove_now();
    match staged {
        Ok(summary) => {
            let _ = output_guard.keep();
            println!(
                "[deploy] output ready at '{}' ({} function(s), digest {})",
                summary.output_root.display(),
                summary.functions,
                summary.tree_digest
            );
            Ok(summary)
        }
        Err(err) => Err(err),
    }
}
