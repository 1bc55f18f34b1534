//! Scoped scratch directories and the run lock.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::fsops::clean_dir;

/// A scratch directory created clean and removed when the guard drops.
///
/// `keep()` disarms the guard and hands the path onward; `remove_now()`
/// removes eagerly. Removal reports instead of failing, so a cleanup
/// problem never masks the error that caused the teardown in the first
/// place.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    /// Create `path` fresh, deleting stale leftovers from a previous run.
    pub fn create_clean(path: PathBuf) -> Result<Self> {
        clean_dir(&path)?;
        Ok(ScratchDir { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and return the path; the contents survive.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        self.path.clone()
    }

    /// Remove the directory now instead of at drop.
    pub fn remove_now(mut self) {
        self.armed = false;
        remove_reporting(&self.path);
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.armed {
            remove_reporting(&self.path);
        }
    }
}

fn remove_reporting(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(path) {
        eprintln!(
            "[deploy] warning: failed to remove scratch directory '{}': {err}; remove it by hand",
            path.display()
        );
    }
}

/// Exclusive advisory lock for the whole staged run.
///
/// Two concurrent runs would interleave writes under the same output and
/// scratch roots; the second run must fail fast instead.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        // Never unlink a stale lock file before locking: a second process
        // could lock a fresh file at the same path and both would proceed.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating run lock '{}'", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            bail!(
                "another build is already running (lock held at '{}')",
                path.display()
            );
        }
        Ok(RunLock {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_clean_wipes_stale_contents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scratch");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.txt"), "old").unwrap();

        let guard = ScratchDir::create_clean(dir.clone()).unwrap();
        assert!(guard.path().is_dir());
        assert!(!dir.join("stale.txt").exists());
    }

    #[test]
    fn drop_removes_the_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scratch");
        {
            let guard = ScratchDir::create_clean(dir.clone()).unwrap();
            fs::write(guard.path().join("work.txt"), "x").unwrap();
        }
        assert!(!dir.exists());
    }

    #[test]
    fn keep_disarms_the_guard() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scratch");
        let kept = {
            let guard = ScratchDir::create_clean(dir.clone()).unwrap();
            fs::write(guard.path().join("work.txt"), "x").unwrap();
            guard.keep()
        };
        assert_eq!(kept, dir);
        assert!(dir.join("work.txt").is_file());
    }

    #[test]
    fn remove_now_removes_eagerly() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scratch");
        let guard = ScratchDir::create_clean(dir.clone()).unwrap();
        guard.remove_now();
        assert!(!dir.exists());
    }

    #[test]
    fn second_lock_acquisition_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".build-lock");

        let held = RunLock::acquire(&path).unwrap();
        let second = RunLock::acquire(&path);
        assert!(second.is_err());
        assert!(second
            .unwrap_err()
            .to_string()
            .contains("another build is already running"));

        drop(held);
        assert!(!path.exists());
        let reacquired = RunLock::acquire(&path);
        assert!(reacquired.is_ok());
    }
}
