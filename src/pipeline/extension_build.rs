//! Run one extension end to end: compile every declared asset, then
//! assemble every declared function into a staged output directory.
//!
//! The two phases are one-directional. `CompiledAssets` is the only way
//! artifacts reach the assembly phase, so assembly can never observe a
//! partially compiled extension. Any error tears down both scratch
//! directories; on success only the staged output survives, and the
//! caller owns its removal.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::functions::assemble_function;
use crate::assemble::resolve::resolve_function;
use crate::compiler::{BundleOptions, Bundler, CompileRequest};
use crate::manifest::ExtensionManifest;
use crate::pipeline::paths::RunPaths;
use crate::pipeline::scratch::ScratchDir;

/// Artifact directories keyed by asset id, produced by the compile phase.
#[derive(Debug)]
pub(crate) struct CompiledAssets {
    by_id: BTreeMap<String, PathBuf>,
}

impl CompiledAssets {
    pub(crate) fn by_id(&self) -> &BTreeMap<String, PathBuf> {
        &self.by_id
    }
}

/// Build one extension. Returns the staged output directory, kept alive
/// for the driver's merge into the shared functions tree.
pub(crate) fn build_extension(
    manifest: &ExtensionManifest,
    substitutions: &BTreeMap<String, String>,
    bundler: &dyn Bundler,
    paths: &RunPaths,
) -> Result<PathBuf> {
    let name = &manifest.name;
    let build_dir = ScratchDir::create_clean(paths.extension_build_dir(name))?;
    let output_dir = ScratchDir::create_clean(paths.extension_output_dir(name))?;

    let build_result = (|| -> Result<()> {
        println!(
            "[deploy:{}] compiling {} asset(s)",
            name,
            manifest.assets.len()
        );
        let artifacts = compile_assets(manifest, substitutions, bundler, build_dir.path())?;

        println!(
            "[deploy:{}] assembling {} function(s)",
            name,
            manifest.functions.len()
        );
        assemble_functions(manifest, &artifacts, output_dir.path())?;
        Ok(())
    })();

    match build_result {
        Ok(()) => {
            build_dir.remove_now();
            Ok(output_dir.keep())
        }
        Err(err) => Err(err).with_context(|| format!("building extension '{name}'")),
    }
}

fn compile_assets(
    manifest: &ExtensionManifest,
    substitutions: &BTreeMap<String, String>,
    bundler: &dyn Bundler,
    build_root: &Path,
) -> Result<CompiledAssets> {
    let defaults = BundleOptions::default();
    let mut by_id = BTreeMap::new();
    for asset in &manifest.assets {
        let input = manifest.root.join(&asset.input);
        if !input.is_file() {
            bail!(
                "extension '{}': asset '{}' input '{}' does not exist",
                manifest.name,
                asset.id,
                input.display()
            );
        }

        // Manifest validation already rejected stem collisions, so this
        // directory cannot exist yet within a clean build root.
        let artifact_dir = build_root.join(asset.artifact_dir_name());
        fs::create_dir(&artifact_dir).with_context(|| {
            format!("creating artifact directory '{}'", artifact_dir.display())
        })?;

        let options = asset.options.apply(&defaults);
        let entry_name = asset.entry_name();
        let request = CompileRequest {
            input: &input,
            artifact_dir: &artifact_dir,
            entry_name: &entry_name,
            options: &options,
            substitutions,
        };
        bundler.compile(&request).with_context(|| {
            format!(
                "compiling asset '{}' of extension '{}'",
                asset.id, manifest.name
            )
        })?;
        by_id.insert(asset.id.clone(), artifact_dir);
    }
    Ok(CompiledAssets { by_id })
}

fn assemble_functions(
    manifest: &ExtensionManifest,
    artifacts: &CompiledAssets,
    out_root: &Path,
) -> Result<()> {
    for function in &manifest.functions {
        let resolved = resolve_function(manifest, artifacts.by_id(), function)?;
        let function_dir = assemble_function(&resolved, out_root)?;
        println!(
            "[deploy:{}] staged function '{}'",
            manifest.name,
            function_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| function_dir.display().to_string())
        );
    }
    Ok(())
}
