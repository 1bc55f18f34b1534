//! Host checks before a build.
//!
//! The pipeline drives exactly one external tool. Probing it up front
//! turns a missing or broken install into one clear error instead of a
//! cryptic mid-run compile failure.

use anyhow::{bail, Context, Result};
use std::process::Command;

use crate::compiler::esbuild::EsbuildBundler;

/// Probe the resolved bundler binary and return its version string.
pub fn check_bundler(bundler: &EsbuildBundler) -> Result<String> {
    let path = bundler.path();
    let output = Command::new(path)
        .arg("--version")
        .output()
        .with_context(|| format!("running '{} --version'", path.display()))?;
    if !output.status.success() {
        bail!(
            "'{} --version' failed with {}: {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        bail!("'{} --version' produced no output", path.display());
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn fake_binary(dir: &Path, name: &str, script: &str) -> EsbuildBundler {
        let path = dir.join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        EsbuildBundler::from_binary(path).unwrap()
    }

    #[test]
    fn reports_the_version_of_a_working_binary() {
        let temp = TempDir::new().unwrap();
        let bundler = fake_binary(temp.path(), "esbuild", "#!/bin/sh\necho 0.21.4\n");
        assert_eq!(check_bundler(&bundler).unwrap(), "0.21.4");
    }

    #[test]
    fn fails_when_the_binary_exits_nonzero() {
        let temp = TempDir::new().unwrap();
        let bundler = fake_binary(
            temp.path(),
            "esbuild",
            "#!/bin/sh\necho broken install >&2\nexit 3\n",
        );
        let err = check_bundler(&bundler).unwrap_err();
        assert!(err.to_string().contains("--version' failed"));
    }

    #[test]
    fn fails_when_the_binary_prints_nothing() {
        let temp = TempDir::new().unwrap();
        let bundler = fake_binary(temp.path(), "esbuild", "#!/bin/sh\nexit 0\n");
        let err = check_bundler(&bundler).unwrap_err();
        assert!(err.to_string().contains("produced no output"));
    }
}
