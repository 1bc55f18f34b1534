//! Filesystem helpers shared by the assembly pipeline.
//!
//! The output tree is never overwritten in place: copies fail when the
//! destination already exists, and directories that must start empty are
//! removed and recreated in one step.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively copy a directory's contents into `dst`, preserving symlinks.
///
/// Directories merge; a file or symlink whose destination already exists is
/// an error. An existing destination signals either a stale previous run or
/// two declarations colliding on disk layout, and both must surface.
pub fn copy_tree_no_clobber(src: &Path, dst: &Path) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)
            .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
    }

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_tree_no_clobber(&src_path, &dst_path)?;
            continue;
        }

        if dst_path.symlink_metadata().is_ok() {
            bail!("refusing to overwrite existing file: {}", dst_path.display());
        }

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("Failed to create symlink: {}", dst_path.display()))?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("Failed to copy file: {}", src_path.display()))?;
        }
    }

    Ok(())
}

/// Remove `dir` if it exists (stale state from an earlier run), then create
/// it fresh.
pub fn clean_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove stale directory: {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(())
}

/// Remove a directory tree if present. A missing directory is not an error.
pub fn remove_dir_if_present(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Compute a deterministic sha256 digest over a directory tree.
///
/// Entries are visited in sorted relative-path order and the digest covers
/// each entry's relative path, kind, and content (file bytes or symlink
/// target). Two trees with the same layout and bytes therefore hash the
/// same regardless of creation order or timestamps.
pub fn tree_digest(root: &Path) -> Result<String> {
    let mut entries: Vec<PathBuf> = vec![];
    for ent in WalkDir::new(root).follow_links(false) {
        let ent = ent.with_context(|| format!("Failed to walk {}", root.display()))?;
        if ent.path() == root {
            continue;
        }
        entries.push(ent.path().to_path_buf());
    }

    entries.sort_by(|a, b| {
        let ra = a.strip_prefix(root).unwrap_or(a).to_string_lossy();
        let rb = b.strip_prefix(root).unwrap_or(b).to_string_lossy();
        ra.cmp(&rb)
    });

    let mut hasher = Sha256::new();
    for p in entries {
        let rel = p
            .strip_prefix(root)
            .unwrap_or(&p)
            .to_string_lossy()
            .replace('\\', "/");
        let md = fs::symlink_metadata(&p)
            .with_context(|| format!("Failed to stat {}", p.display()))?;

        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        if md.is_dir() {
            hasher.update(b"dir");
        } else if md.file_type().is_symlink() {
            hasher.update(b"link");
            hasher.update(fs::read_link(&p)?.to_string_lossy().as_bytes());
        } else {
            hasher.update(b"file");
            hash_file_into(&mut hasher, &p)?;
        }
        hasher.update([0u8]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_file_into(hasher: &mut Sha256, path: &Path) -> Result<()> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}
