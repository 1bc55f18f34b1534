//! Build-and-assemble pipeline for deployable site extensions.
//!
//! Compiles the JavaScript sources of site extensions with esbuild and
//! assembles the result, together with the prebuilt static site, into a
//! Build Output API v3 tree that the deployment platform picks up as-is:
//!
//! - **Run configuration** - Optional `deploy-builder.json` selecting the
//!   static directory and the enabled extensions
//! - **Extension manifests** - Per-extension `extension.toml` declaring
//!   assets, functions, and bundle overrides
//! - **Compiler boundary** - esbuild as a black box behind the [`Bundler`]
//!   trait
//! - **Output assembly** - Function directories, runtime descriptors, and
//!   the routing manifest
//! - **Staged driver** - All-or-nothing runs with scoped scratch state
//!
//! # Architecture
//!
//! ```text
//! deploy-builder (this crate)
//!     │
//!     ├── config     deploy-builder.json, per-extension settings
//!     ├── manifest   extensions/<name>/extension.toml
//!     ├── compiler   esbuild behind the Bundler trait
//!     ├── assemble   function directories and descriptors
//!     └── pipeline   staged driver, scratch ownership, run lock
//! ```
//!
//! A run validates every input first, then builds under scratch
//! directories and only keeps `.vercel/output/` when every stage
//! succeeded. A failed run leaves the working directory as it was.
//!
//! # Example
//!
//! ```rust,ignore
//! use deploy_builder::{load_run_config, EsbuildBundler, RunContext};
//!
//! let config = load_run_config(&work_dir)?;
//! let bundler = EsbuildBundler::discover(&work_dir)?;
//! let ctx = RunContext::new(work_dir, extensions_root, config);
//! let summary = deploy_builder::run(&ctx, &bundler)?;
//! println!("{} function(s), digest {}", summary.functions, summary.tree_digest);
//! ```

pub mod assemble;
pub mod compiler;
pub mod config;
pub mod fsops;
pub mod manifest;
pub mod pipeline;
pub mod preflight;

pub use compiler::esbuild::EsbuildBundler;
pub use compiler::Bundler;
pub use config::{load_run_config, RunConfig};
pub use pipeline::driver::{run, RunContext, RunSummary};
