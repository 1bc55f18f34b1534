//! Output Assembler: lay one resolved function out on disk.
//!
//! Copy order is fixed: primary artifact first, dependencies second,
//! descriptor last. Every copy is no-clobber, which surfaces declaration
//! bugs where two assets collide on disk layout.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{function_dir_rel, is_function_dir_name, VC_CONFIG_FILE};
use crate::assemble::resolve::ResolvedFunction;
use crate::fsops::copy_tree_no_clobber;

/// Assemble one function under `out_root`. Returns the function directory.
pub fn assemble_function(resolved: &ResolvedFunction<'_>, out_root: &Path) -> Result<PathBuf> {
    let rel = function_dir_rel(resolved.primary_output);
    let function_dir = out_root.join(&rel);
    if function_dir.exists() {
        bail!(
            "function directory collision: '{}' already exists",
            function_dir.display()
        );
    }
    fs::create_dir_all(&function_dir)
        .with_context(|| format!("creating function directory '{}'", function_dir.display()))?;

    copy_tree_no_clobber(resolved.primary_artifact, &function_dir).with_context(|| {
        format!(
            "copying entry files for function '{}'",
            resolved.function.id
        )
    })?;

    for dependency in &resolved.dependencies {
        // The dependency's declared output path is preserved relative to
        // the function directory.
        let dest = match dependency.output.parent() {
            Some(parent) if parent != Path::new("") => function_dir.join(parent),
            _ => function_dir.clone(),
        };
        copy_tree_no_clobber(dependency.artifact, &dest).with_context(|| {
            format!(
                "copying dependency '{}' into function '{}'",
                dependency.id, resolved.function.id
            )
        })?;
    }

    let descriptor = function_dir.join(VC_CONFIG_FILE);
    if descriptor.symlink_metadata().is_ok() {
        bail!(
            "function '{}' already contains a file named '{}'",
            resolved.function.id,
            VC_CONFIG_FILE
        );
    }
    let vc_config = serde_json::to_value(&resolved.function.vc_config).with_context(|| {
        format!(
            "serializing configuration for function '{}'",
            resolved.function.id
        )
    })?;
    let bytes = serde_json::to_vec_pretty(&vc_config)?;
    fs::write(&descriptor, bytes)
        .with_context(|| format!("writing function descriptor '{}'", descriptor.display()))?;

    Ok(function_dir)
}

/// Merge one extension's staged functions into the shared functions tree.
///
/// Plain parent directories merge so extensions can share them (e.g.
/// `api/`), but a function directory that already exists in the
/// destination is a collision between extensions and fails the merge.
pub fn merge_function_trees(src: &Path, dst: &Path) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)
            .with_context(|| format!("creating functions directory '{}'", dst.display()))?;
    }

    for entry in fs::read_dir(src)
        .with_context(|| format!("reading staged functions '{}'", src.display()))?
    {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if is_function_dir_name(&entry.file_name()) {
                if dst_path.exists() {
                    bail!(
                        "function directory collision: '{}' already exists",
                        dst_path.display()
                    );
                }
                copy_tree_no_clobber(&src_path, &dst_path)?;
            } else {
                merge_function_trees(&src_path, &dst_path)?;
            }
            continue;
        }

        if dst_path.symlink_metadata().is_ok() {
            bail!("refusing to overwrite existing file: {}", dst_path.display());
        }
        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("creating symlink '{}'", dst_path.display()))?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("copying '{}'", src_path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::resolve::ResolvedDependency;
    use crate::manifest::FunctionSpec;
    use tempfile::TempDir;

    fn vc_config_edge() -> toml::Table {
        toml::from_str("runtime = \"edge\"").unwrap()
    }

    fn write_artifact(dir: &Path, entry: &str, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(entry), contents).unwrap();
    }

    #[test]
    fn assembles_entry_dependencies_and_descriptor() {
        let temp = TempDir::new().unwrap();
        let mw_artifact = temp.path().join("build/middleware");
        let cfg_artifact = temp.path().join("build/auth.config");
        write_artifact(&mw_artifact, "middleware.js", "mw code");
        write_artifact(&cfg_artifact, "auth.config.js", "cfg code");
        let out_root = temp.path().join("out");

        let function = FunctionSpec {
            id: "mw".to_string(),
            dependencies: vec!["cfg".to_string()],
            vc_config: vc_config_edge(),
        };
        let resolved = ResolvedFunction {
            function: &function,
            primary_output: Path::new("middleware.js"),
            primary_artifact: &mw_artifact,
            dependencies: vec![ResolvedDependency {
                id: "cfg",
                output: Path::new("auth.config.js"),
                artifact: &cfg_artifact,
            }],
        };

        let function_dir = assemble_function(&resolved, &out_root).unwrap();
        assert_eq!(function_dir, out_root.join("middleware.func"));
        assert_eq!(
            fs::read_to_string(function_dir.join("middleware.js")).unwrap(),
            "mw code"
        );
        assert_eq!(
            fs::read_to_string(function_dir.join("auth.config.js")).unwrap(),
            "cfg code"
        );

        let descriptor: serde_json::Value =
            serde_json::from_slice(&fs::read(function_dir.join(VC_CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(descriptor, serde_json::json!({"runtime": "edge"}));
    }

    #[test]
    fn nested_dependency_outputs_keep_their_parents() {
        let temp = TempDir::new().unwrap();
        let mw_artifact = temp.path().join("build/middleware");
        let helper_artifact = temp.path().join("build/helper");
        write_artifact(&mw_artifact, "middleware.js", "mw");
        write_artifact(&helper_artifact, "helper.js", "helper");
        let out_root = temp.path().join("out");

        let function = FunctionSpec {
            id: "mw".to_string(),
            dependencies: vec!["helper".to_string()],
            vc_config: toml::Table::new(),
        };
        let resolved = ResolvedFunction {
            function: &function,
            primary_output: Path::new("middleware.js"),
            primary_artifact: &mw_artifact,
            dependencies: vec![ResolvedDependency {
                id: "helper",
                output: Path::new("lib/helper.js"),
                artifact: &helper_artifact,
            }],
        };

        let function_dir = assemble_function(&resolved, &out_root).unwrap();
        assert!(function_dir.join("lib/helper.js").exists());
    }

    #[test]
    fn existing_function_directory_is_a_collision() {
        let temp = TempDir::new().unwrap();
        let mw_artifact = temp.path().join("build/middleware");
        write_artifact(&mw_artifact, "middleware.js", "mw");
        let out_root = temp.path().join("out");
        fs::create_dir_all(out_root.join("middleware.func")).unwrap();

        let function = FunctionSpec {
            id: "mw".to_string(),
            dependencies: vec![],
            vc_config: toml::Table::new(),
        };
        let resolved = ResolvedFunction {
            function: &function,
            primary_output: Path::new("middleware.js"),
            primary_artifact: &mw_artifact,
            dependencies: vec![],
        };

        let err = assemble_function(&resolved, &out_root).unwrap_err();
        assert!(
            err.to_string().contains("function directory collision"),
            "got: {err:#}"
        );
    }

    #[test]
    fn stray_descriptor_in_an_artifact_fails_the_assembly() {
        let temp = TempDir::new().unwrap();
        let mw_artifact = temp.path().join("build/middleware");
        write_artifact(&mw_artifact, "middleware.js", "mw");
        write_artifact(&mw_artifact, VC_CONFIG_FILE, "{\"stray\": true}");
        let out_root = temp.path().join("out");

        let function = FunctionSpec {
            id: "mw".to_string(),
            dependencies: vec![],
            vc_config: vc_config_edge(),
        };
        let resolved = ResolvedFunction {
            function: &function,
            primary_output: Path::new("middleware.js"),
            primary_artifact: &mw_artifact,
            dependencies: vec![],
        };

        let err = assemble_function(&resolved, &out_root).unwrap_err();
        assert!(
            err.to_string()
                .contains("already contains a file named '.vc-config.json'"),
            "got: {err:#}"
        );
        // The copied file keeps its contents instead of being replaced.
        assert_eq!(
            fs::read_to_string(out_root.join("middleware.func").join(VC_CONFIG_FILE)).unwrap(),
            "{\"stray\": true}"
        );
    }

    #[test]
    fn merge_combines_disjoint_function_directories() {
        let temp = TempDir::new().unwrap();
        let staged_a = temp.path().join("a");
        let staged_b = temp.path().join("b");
        fs::create_dir_all(staged_a.join("middleware.func")).unwrap();
        fs::write(staged_a.join("middleware.func/middleware.js"), "a").unwrap();
        fs::create_dir_all(staged_b.join("api/hello.func")).unwrap();
        fs::write(staged_b.join("api/hello.func/hello.js"), "b").unwrap();

        let functions = temp.path().join("functions");
        merge_function_trees(&staged_a, &functions).unwrap();
        merge_function_trees(&staged_b, &functions).unwrap();

        assert!(functions.join("middleware.func/middleware.js").exists());
        assert!(functions.join("api/hello.func/hello.js").exists());
    }

    #[test]
    fn merge_rejects_colliding_function_directories() {
        let temp = TempDir::new().unwrap();
        let staged_a = temp.path().join("a");
        let staged_b = temp.path().join("b");
        // Same function directory from two extensions, different files, so
        // a file-level check alone would not catch it.
        fs::create_dir_all(staged_a.join("middleware.func")).unwrap();
        fs::write(staged_a.join("middleware.func/one.js"), "a").unwrap();
        fs::create_dir_all(staged_b.join("middleware.func")).unwrap();
        fs::write(staged_b.join("middleware.func/two.js"), "b").unwrap();

        let functions = temp.path().join("functions");
        merge_function_trees(&staged_a, &functions).unwrap();
        let err = merge_function_trees(&staged_b, &functions).unwrap_err();
        assert!(
            err.to_string().contains("function directory collision"),
            "got: {err:#}"
        );
    }

    #[test]
    fn merge_lets_extensions_share_plain_parent_directories() {
        let temp = TempDir::new().unwrap();
        let staged_a = temp.path().join("a");
        let staged_b = temp.path().join("b");
        fs::create_dir_all(staged_a.join("api/one.func")).unwrap();
        fs::write(staged_a.join("api/one.func/one.js"), "1").unwrap();
        fs::create_dir_all(staged_b.join("api/two.func")).unwrap();
        fs::write(staged_b.join("api/two.func/two.js"), "2").unwrap();

        let functions = temp.path().join("functions");
        merge_function_trees(&staged_a, &functions).unwrap();
        merge_function_trees(&staged_b, &functions).unwrap();

        assert!(functions.join("api/one.func/one.js").exists());
        assert!(functions.join("api/two.func/two.js").exists());
    }
}
