//! Dependency Resolver: locate the compiled artifact directory for every
//! asset id a deployment function references.
//!
//! The manifest is validated at load time, so an unresolved id here means
//! the descriptor and the compile phase disagree. That inconsistency is
//! fatal: silently skipping a dependency would deploy a broken function.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{ExtensionManifest, FunctionSpec};

/// A deployment function whose asset ids have all been located on disk.
#[derive(Debug)]
pub struct ResolvedFunction<'a> {
    pub function: &'a FunctionSpec,
    /// Declared output path of the primary asset; names the function
    /// directory.
    pub primary_output: &'a Path,
    /// Artifact directory the compiler produced for the primary asset.
    pub primary_artifact: &'a Path,
    pub dependencies: Vec<ResolvedDependency<'a>>,
}

/// One dependency artifact plus the declared output path that dictates
/// where its files land inside the function directory.
#[derive(Debug)]
pub struct ResolvedDependency<'a> {
    pub id: &'a str,
    pub output: &'a Path,
    pub artifact: &'a Path,
}

/// Resolve one function against the compiled `{asset id → artifact dir}`
/// map.
pub fn resolve_function<'a>(
    manifest: &'a ExtensionManifest,
    artifacts: &'a BTreeMap<String, PathBuf>,
    function: &'a FunctionSpec,
) -> Result<ResolvedFunction<'a>> {
    let primary = match manifest.asset(&function.id) {
        Some(asset) => asset,
        None => bail!(
            "extension '{}': function '{}' references an undeclared asset id",
            manifest.name,
            function.id
        ),
    };
    let primary_artifact = artifact_for(manifest, artifacts, &function.id)?;

    let mut dependencies = Vec::with_capacity(function.dependencies.len());
    for id in &function.dependencies {
        let asset = match manifest.asset(id) {
            Some(asset) => asset,
            None => bail!(
                "extension '{}': function '{}' depends on undeclared asset id '{}'",
                manifest.name,
                function.id,
                id
            ),
        };
        dependencies.push(ResolvedDependency {
            id,
            output: &asset.output,
            artifact: artifact_for(manifest, artifacts, id)?,
        });
    }

    Ok(ResolvedFunction {
        function,
        primary_output: &primary.output,
        primary_artifact,
        dependencies,
    })
}

fn artifact_for<'a>(
    manifest: &ExtensionManifest,
    artifacts: &'a BTreeMap<String, PathBuf>,
    id: &str,
) -> Result<&'a Path> {
    match artifacts.get(id) {
        Some(dir) => Ok(dir.as_path()),
        None => bail!(
            "extension '{}': no compiled artifact for asset '{}'",
            manifest.name,
            id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::BundleOverrides;
    use crate::manifest::AssetSpec;
    use std::path::PathBuf;

    fn test_manifest() -> ExtensionManifest {
        ExtensionManifest {
            name: "auth".to_string(),
            root: PathBuf::from("/ext/auth"),
            assets: vec![
                AssetSpec {
                    id: "mw".to_string(),
                    input: PathBuf::from("middleware.js"),
                    output: PathBuf::from("middleware.js"),
                    options: BundleOverrides::default(),
                },
                AssetSpec {
                    id: "cfg".to_string(),
                    input: PathBuf::from("auth.config.js"),
                    output: PathBuf::from("auth.config.js"),
                    options: BundleOverrides::default(),
                },
            ],
            functions: vec![FunctionSpec {
                id: "mw".to_string(),
                dependencies: vec!["cfg".to_string()],
                vc_config: toml::Table::new(),
            }],
        }
    }

    #[test]
    fn resolves_primary_and_dependencies() {
        let manifest = test_manifest();
        let artifacts = BTreeMap::from([
            ("mw".to_string(), PathBuf::from("/build/middleware")),
            ("cfg".to_string(), PathBuf::from("/build/auth.config")),
        ]);

        let resolved =
            resolve_function(&manifest, &artifacts, &manifest.functions[0]).unwrap();
        assert_eq!(resolved.primary_output, Path::new("middleware.js"));
        assert_eq!(resolved.primary_artifact, Path::new("/build/middleware"));
        assert_eq!(resolved.dependencies.len(), 1);
        assert_eq!(resolved.dependencies[0].id, "cfg");
        assert_eq!(
            resolved.dependencies[0].artifact,
            Path::new("/build/auth.config")
        );
    }

    #[test]
    fn missing_artifact_is_fatal_and_names_the_id() {
        let manifest = test_manifest();
        // Compile phase produced only the primary artifact.
        let artifacts = BTreeMap::from([("mw".to_string(), PathBuf::from("/build/middleware"))]);

        let err = resolve_function(&manifest, &artifacts, &manifest.functions[0]).unwrap_err();
        assert!(
            err.to_string().contains("no compiled artifact for asset 'cfg'"),
            "got: {err:#}"
        );
    }

    #[test]
    fn undeclared_dependency_is_fatal() {
        let mut manifest = test_manifest();
        manifest.functions[0].dependencies = vec!["ghost".to_string()];
        let artifacts = BTreeMap::from([
            ("mw".to_string(), PathBuf::from("/build/middleware")),
            ("cfg".to_string(), PathBuf::from("/build/auth.config")),
        ]);

        let err = resolve_function(&manifest, &artifacts, &manifest.functions[0]).unwrap_err();
        assert!(
            err.to_string().contains("undeclared asset id 'ghost'"),
            "got: {err:#}"
        );
    }
}
