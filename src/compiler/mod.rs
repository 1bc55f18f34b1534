//! Bundler boundary: compile options and the trait the pipeline drives.
//!
//! The bundler itself is a black box. The pipeline hands it one
//! [`CompileRequest`] per declared asset and only cares that the artifact
//! directory ends up holding the compiled entry file (plus whatever
//! companions the bundler emits: source maps, WASM, chunks). Everything
//! above this boundary is testable against a stub implementation.

pub mod esbuild;

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Module format handed to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Esm,
    Cjs,
    Iife,
}

impl ModuleFormat {
    pub fn as_flag(&self) -> &'static str {
        match self {
            ModuleFormat::Esm => "esm",
            ModuleFormat::Cjs => "cjs",
            ModuleFormat::Iife => "iife",
        }
    }
}

/// Platform flavor handed to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Browser,
    Node,
    Neutral,
}

impl Platform {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Platform::Browser => "browser",
            Platform::Node => "node",
            Platform::Neutral => "neutral",
        }
    }
}

/// Full option set for one compile.
///
/// The defaults are the edge-runtime profile: ESM, minified, tree-shaken,
/// with a companion source map, and `process.cwd` stubbed to an empty
/// string since there is no filesystem-rooted cwd where the function runs.
/// Bundling transitive imports is opt-in per asset; when it is on, the
/// platform-reserved `node:*` modules stay external so the runtime provides
/// them instead of the bundle inlining (and breaking) them.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub bundle: bool,
    pub format: ModuleFormat,
    pub target: String,
    pub platform: Platform,
    pub minify: bool,
    pub sourcemap: bool,
    pub tree_shaking: bool,
    /// Import specifiers passed through untouched when bundling.
    pub external: Vec<String>,
    /// Compile-time symbol substitutions, `symbol -> replacement expression`.
    pub defines: BTreeMap<String, String>,
}

/// Import specifiers the deployment platform provides at runtime.
pub const RESERVED_EXTERNALS: &[&str] = &["node:*"];

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            bundle: false,
            format: ModuleFormat::Esm,
            target: "es2022".to_string(),
            platform: Platform::Browser,
            minify: true,
            sourcemap: true,
            tree_shaking: true,
            external: RESERVED_EXTERNALS.iter().map(|s| s.to_string()).collect(),
            defines: BTreeMap::from([("process.cwd".to_string(), "\"\"".to_string())]),
        }
    }
}

/// Per-asset overrides declared in the extension manifest.
///
/// Only the fields a manifest sets are overridden; everything else keeps
/// the [`BundleOptions`] defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleOverrides {
    pub bundle: Option<bool>,
    pub format: Option<ModuleFormat>,
    pub target: Option<String>,
    pub platform: Option<Platform>,
    pub minify: Option<bool>,
    pub sourcemap: Option<bool>,
    pub tree_shaking: Option<bool>,
}

impl BundleOverrides {
    /// Apply these overrides on top of `base`.
    pub fn apply(&self, base: &BundleOptions) -> BundleOptions {
        let mut options = base.clone();
        if let Some(bundle) = self.bundle {
            options.bundle = bundle;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(target) = &self.target {
            options.target = target.clone();
        }
        if let Some(platform) = self.platform {
            options.platform = platform;
        }
        if let Some(minify) = self.minify {
            options.minify = minify;
        }
        if let Some(sourcemap) = self.sourcemap {
            options.sourcemap = sourcemap;
        }
        if let Some(tree_shaking) = self.tree_shaking {
            options.tree_shaking = tree_shaking;
        }
        options
    }
}

/// One compile: a source file into an already-created, empty artifact
/// directory. `entry_name` is the base name the compiled entry must have
/// inside the artifact directory.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    pub input: &'a Path,
    pub artifact_dir: &'a Path,
    pub entry_name: &'a str,
    pub options: &'a BundleOptions,
    /// Extension-level substitutions, merged over `options.defines`.
    pub substitutions: &'a BTreeMap<String, String>,
}

impl CompileRequest<'_> {
    /// Effective substitution map: option defaults overlaid with the
    /// extension-level entries, in sorted key order.
    pub fn merged_defines(&self) -> BTreeMap<String, String> {
        let mut defines = self.options.defines.clone();
        for (key, value) in self.substitutions {
            defines.insert(key.clone(), value.clone());
        }
        defines
    }
}

/// The black-box compiler the pipeline drives.
///
/// A failed compile aborts the whole extension build; implementations
/// should surface the compiler's own diagnostics in the error.
pub trait Bundler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<()>;
}
