use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Create the directory if it doesn't exist; error if a non-directory exists there.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Error unless the file already exists.
pub fn require_file_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    Ok(())
}

/// Write `bytes` to `path` atomically: a temp file in the same directory is
/// filled first, then renamed over the target. A cancelled run never leaves a
/// partial artifact behind.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent()
        .ok_or_else(|| anyhow::anyhow!("Cannot write to path without a parent: {}", path.display()))?;
    ensure_dir_exists(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist {}", path.display()))?;
    Ok(())
}
