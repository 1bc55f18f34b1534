//! Extension descriptor: the `extension.toml` manifest collocated with an
//! extension's sources.
//!
//! The manifest declares the assets to compile and the deployment functions
//! assembled from them. It is loaded once per extension and fully validated
//! up front: every function and dependency must reference a declared asset,
//! ids must be unique, paths must stay inside the extension directory, and
//! no output may claim the platform's reserved descriptor file name.
//! A manifest that fails validation aborts the run before anything is
//! written.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::assemble::VC_CONFIG_FILE;
use crate::compiler::BundleOverrides;

/// Manifest file name inside an extension directory.
pub const MANIFEST_FILE: &str = "extension.toml";

/// One named source-to-output compilation unit.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    pub id: String,
    /// Source file, relative to the extension directory.
    pub input: PathBuf,
    /// Declared output file, relative within the assembled artifact.
    pub output: PathBuf,
    pub options: BundleOverrides,
}

impl AssetSpec {
    /// Name of this asset's scratch artifact directory, derived from the
    /// output file's base name.
    pub fn artifact_dir_name(&self) -> String {
        self.output
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    /// Base name the compiled entry file keeps inside the artifact.
    pub fn entry_name(&self) -> String {
        self.output
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

/// One named deployable unit: a primary asset plus file-level dependencies.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    /// Must match exactly one declared asset id.
    pub id: String,
    /// Asset ids copied into this function's directory but not deployed as
    /// their own functions.
    pub dependencies: Vec<String>,
    /// Opaque platform configuration, written verbatim to the function's
    /// descriptor file.
    pub vc_config: toml::Table,
}

/// A loaded, validated extension descriptor.
#[derive(Debug, Clone)]
pub struct ExtensionManifest {
    pub name: String,
    /// Extension directory holding the manifest and sources.
    pub root: PathBuf,
    pub assets: Vec<AssetSpec>,
    pub functions: Vec<FunctionSpec>,
}

impl ExtensionManifest {
    pub fn asset(&self, id: &str) -> Option<&AssetSpec> {
        self.assets.iter().find(|asset| asset.id == id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestToml {
    #[serde(default)]
    assets: Vec<AssetToml>,
    #[serde(default)]
    deployment: DeploymentToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssetToml {
    id: String,
    input: String,
    output: String,
    #[serde(default)]
    options: BundleOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeploymentToml {
    #[serde(default)]
    functions: Vec<FunctionToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionToml {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    vc_config: toml::Table,
}

/// Load and validate the manifest for extension `name` rooted at `dir`.
pub fn load_extension_manifest(name: &str, dir: &Path) -> Result<ExtensionManifest> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes = fs::read_to_string(&manifest_path)
        .with_context(|| format!("reading extension manifest '{}'", manifest_path.display()))?;
    let parsed: ManifestToml = toml::from_str(&manifest_bytes)
        .with_context(|| format!("parsing extension manifest '{}'", manifest_path.display()))?;

    let mut assets = Vec::with_capacity(parsed.assets.len());
    let mut seen_ids = BTreeSet::new();
    let mut artifact_dirs: BTreeMap<String, String> = BTreeMap::new();
    for asset in parsed.assets {
        let id = asset.id.trim().to_string();
        if id.is_empty() {
            bail!(
                "invalid extension manifest '{}': asset id must not be empty",
                manifest_path.display()
            );
        }
        if !seen_ids.insert(id.clone()) {
            bail!(
                "invalid extension manifest '{}': duplicate asset id '{}'",
                manifest_path.display(),
                id
            );
        }

        let input = parse_relative_path(&asset.input, &manifest_path, "asset input")?;
        let output = parse_relative_path(&asset.output, &manifest_path, "asset output")?;
        let spec = AssetSpec {
            id: id.clone(),
            input,
            output,
            options: asset.options,
        };

        let dir_name = spec.artifact_dir_name();
        if dir_name.is_empty() {
            bail!(
                "invalid extension manifest '{}': asset '{}' output '{}' has no usable base name",
                manifest_path.display(),
                id,
                spec.output.display()
            );
        }
        if spec.entry_name() == VC_CONFIG_FILE {
            bail!(
                "invalid extension manifest '{}': asset '{}' output '{}' is reserved for the function descriptor",
                manifest_path.display(),
                id,
                spec.output.display()
            );
        }
        if let Some(previous) = artifact_dirs.insert(dir_name.clone(), id.clone()) {
            bail!(
                "invalid extension manifest '{}': assets '{}' and '{}' both compile to artifact directory '{}'",
                manifest_path.display(),
                previous,
                id,
                dir_name
            );
        }

        assets.push(spec);
    }

    let mut functions = Vec::with_capacity(parsed.deployment.functions.len());
    let mut seen_functions = BTreeSet::new();
    for function in parsed.deployment.functions {
        let id = function.id.trim().to_string();
        if !seen_ids.contains(&id) {
            bail!(
                "invalid extension manifest '{}': function '{}' does not match any declared asset",
                manifest_path.display(),
                id
            );
        }
        if !seen_functions.insert(id.clone()) {
            bail!(
                "invalid extension manifest '{}': duplicate function id '{}'",
                manifest_path.display(),
                id
            );
        }

        let mut dependencies = Vec::with_capacity(function.dependencies.len());
        for dependency in function.dependencies {
            let dependency = dependency.trim().to_string();
            if !seen_ids.contains(&dependency) {
                bail!(
                    "invalid extension manifest '{}': function '{}' depends on unknown asset id '{}'",
                    manifest_path.display(),
                    id,
                    dependency
                );
            }
            if dependency == id {
                bail!(
                    "invalid extension manifest '{}': function '{}' lists its own asset as a dependency",
                    manifest_path.display(),
                    id
                );
            }
            if dependencies.contains(&dependency) {
                bail!(
                    "invalid extension manifest '{}': function '{}' lists dependency '{}' twice",
                    manifest_path.display(),
                    id,
                    dependency
                );
            }
            dependencies.push(dependency);
        }

        functions.push(FunctionSpec {
            id,
            dependencies,
            vc_config: function.vc_config,
        });
    }

    Ok(ExtensionManifest {
        name: name.to_string(),
        root: dir.to_path_buf(),
        assets,
        functions,
    })
}

fn parse_relative_path(raw: &str, manifest_path: &Path, field: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!(
            "invalid extension manifest '{}': {} must not be empty",
            manifest_path.display(),
            field
        );
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        bail!(
            "invalid extension manifest '{}': {} must be relative, got '{}'",
            manifest_path.display(),
            field,
            trimmed
        );
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!(
                "invalid extension manifest '{}': {} must not escape the extension directory, got '{}'",
                manifest_path.display(),
                field,
                trimmed
            ),
        }
    }
    Ok(path.to_path_buf())
}
