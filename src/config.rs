//! User-facing run configuration.
//!
//! An optional `deploy-builder.json` in the working directory selects the
//! static directory and the enabled extensions. The file is read leniently:
//! a missing file silently means defaults, a file that is not valid JSON
//! logs a fallback notice and means defaults. Values that parse but cannot
//! be honored (an untypeable extension section, an invalid environment
//! variable name) are fatal instead, because building with default secret
//! names the user did not ask for would deploy a function that reads the
//! wrong secrets.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Run configuration file name, collocated with the working directory.
pub const RUN_CONFIG_FILE: &str = "deploy-builder.json";

/// Static directory used when the configuration does not name one.
pub const DEFAULT_STATIC_DIRECTORY: &str = "dist";

/// The extension enabled by default.
pub const AUTH_EXTENSION: &str = "auth";

const DEFAULT_PROVIDER: &str = "github";

// Default environment-variable names the auth sources reference. The
// configuration remaps them per deployment at compile time.
const SECRET_VAR: &str = "AUTH_SECRET";
const CLIENT_ID_VAR: &str = "AUTH_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "AUTH_CLIENT_SECRET";
const ISSUER_VAR: &str = "AUTH_ISSUER";

/// Typed run configuration, after defaults and validation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub static_directory: String,
    /// Enabled extensions, in declaration order.
    pub extensions: Vec<(String, ExtensionConfig)>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            static_directory: DEFAULT_STATIC_DIRECTORY.to_string(),
            extensions: vec![(AUTH_EXTENSION.to_string(), ExtensionConfig::default())],
        }
    }
}

/// Per-extension configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
}

/// User-designated environment-variable names for the named secrets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariables {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
}

impl ExtensionConfig {
    /// Compile-time symbol substitutions for this extension.
    ///
    /// For the auth extension the four secret placeholders are remapped to
    /// references to the configured environment-variable names (the default
    /// name when unconfigured, so command lines stay deterministic), and the
    /// provider is surfaced as a JSON-quoted string. Other extensions get no
    /// extension-level substitutions.
    pub fn substitutions(&self, extension_name: &str) -> BTreeMap<String, String> {
        let mut defines = BTreeMap::new();
        if extension_name != AUTH_EXTENSION {
            return defines;
        }

        let provider = self.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        defines.insert(
            "process.env.AUTH_PROVIDER".to_string(),
            serde_json::Value::String(provider.to_string()).to_string(),
        );

        let vars = &self.environment_variables;
        for (placeholder, configured) in [
            (SECRET_VAR, vars.secret.as_deref()),
            (CLIENT_ID_VAR, vars.client_id.as_deref()),
            (CLIENT_SECRET_VAR, vars.client_secret.as_deref()),
            (ISSUER_VAR, vars.issuer.as_deref()),
        ] {
            let var_name = configured.unwrap_or(placeholder);
            defines.insert(
                format!("process.env.{}", placeholder),
                format!("process.env.{}", var_name),
            );
        }
        defines
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunConfigFile {
    #[serde(default)]
    static_directory: Option<String>,
    // Values stay untyped here so declaration order survives and per
    // extension typing errors can be reported with the extension's name.
    #[serde(default)]
    extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Load the run configuration for `work_dir`.
pub fn load_run_config(work_dir: &Path) -> Result<RunConfig> {
    let path = work_dir.join(RUN_CONFIG_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunConfig::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("reading run config '{}'", path.display()))
        }
    };

    let parsed: RunConfigFile = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!(
                "[deploy] warning: malformed run config '{}': {}; falling back to built-in defaults",
                path.display(),
                err
            );
            return Ok(RunConfig::default());
        }
    };

    let static_directory = parsed
        .static_directory
        .map(|dir| dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| DEFAULT_STATIC_DIRECTORY.to_string());

    let extensions = match parsed.extensions {
        None => RunConfig::default().extensions,
        Some(map) => {
            let mut extensions = Vec::with_capacity(map.len());
            for (name, value) in map {
                let section: ExtensionConfig =
                    serde_json::from_value(value).with_context(|| {
                        format!(
                            "invalid run config '{}': extension '{}' section is not usable",
                            path.display(),
                            name
                        )
                    })?;
                extensions.push((name, section));
            }
            extensions
        }
    };

    let config = RunConfig {
        static_directory,
        extensions,
    };
    config
        .validate()
        .with_context(|| format!("invalid run config '{}'", path.display()))?;
    Ok(config)
}

impl RunConfig {
    /// Reject values the pipeline could not honor.
    pub fn validate(&self) -> Result<()> {
        for (name, section) in &self.extensions {
            if name.trim().is_empty()
                || name.contains('/')
                || name.contains('\\')
                || name.contains("..")
            {
                bail!("extension name '{}' is not a safe directory name", name);
            }
            if let Some(provider) = &section.provider {
                if provider.trim().is_empty() {
                    bail!("extension '{}' has an empty provider", name);
                }
            }
            let vars = &section.environment_variables;
            for (field, value) in [
                ("secret", vars.secret.as_deref()),
                ("clientId", vars.client_id.as_deref()),
                ("clientSecret", vars.client_secret.as_deref()),
                ("issuer", vars.issuer.as_deref()),
            ] {
                if let Some(value) = value {
                    if !is_env_var_name(value) {
                        bail!(
                            "extension '{}' maps {} to '{}', which is not a valid environment variable name",
                            name,
                            field,
                            value
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
