use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use deploy_builder::fsops::remove_dir_if_present;
use deploy_builder::pipeline::paths::RunPaths;
use deploy_builder::pipeline::resolve_extensions_root;
use deploy_builder::{load_run_config, preflight, EsbuildBundler, RunContext};

fn usage() -> &'static str {
    "Usage:\n  deploy-builder build [work_dir]\n  deploy-builder clean [work_dir]\n\nbuild assembles the deployable output tree at <work_dir>/.vercel/output\nfrom the prebuilt static site plus the enabled extensions; clean removes\nthat tree again. work_dir defaults to the current directory."
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd] if cmd == "build" => build(None),
        [cmd, dir] if cmd == "build" => build(Some(dir)),
        [cmd] if cmd == "clean" => clean(None),
        [cmd, dir] if cmd == "clean" => clean(Some(dir)),
        [cmd] if cmd == "help" || cmd == "--help" || cmd == "-h" => {
            println!("{}", usage());
            Ok(())
        }
        _ => bail!(usage()),
    }
}

fn resolve_work_dir(dir: Option<&String>) -> Result<PathBuf> {
    let raw = match dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let work_dir = raw
        .canonicalize()
        .with_context(|| format!("resolving working directory '{}'", raw.display()))?;
    if !work_dir.is_dir() {
        bail!("working directory '{}' is not a directory", work_dir.display());
    }
    Ok(work_dir)
}

fn build(dir: Option<&String>) -> Result<()> {
    let work_dir = resolve_work_dir(dir)?;
    let config = load_run_config(&work_dir)?;

    let bundler = EsbuildBundler::discover(&work_dir)?;
    let version = preflight::check_bundler(&bundler)?;
    println!(
        "[deploy] esbuild {} at '{}'",
        version,
        bundler.path().display()
    );

    let extensions_root = resolve_extensions_root(&work_dir);
    let ctx = RunContext::new(work_dir, extensions_root, config);
    deploy_builder::run(&ctx, &bundler)?;
    Ok(())
}

fn clean(dir: Option<&String>) -> Result<()> {
    let work_dir = resolve_work_dir(dir)?;
    let paths = RunPaths::new(&work_dir);

    for target in [&paths.output_root, &paths.scratch_root] {
        if target.exists() {
            remove_dir_if_present(target)?;
            println!("[deploy] removed '{}'", target.display());
        }
    }
    // The platform directory may hold state owned by other tools; only
    // drop it once it is empty.
    let _ = std::fs::remove_dir(&paths.platform_dir);
    Ok(())
}
