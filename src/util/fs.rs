//! Filesystem utilities.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Read at most `limit` lines from the start of a file.
///
/// Invalid UTF-8 lines end the read instead of failing it; stamps and
/// heuristics only ever look at the plain-text header of a file.
pub fn read_head_lines(path: &Path, limit: usize) -> Result<Vec<String>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::with_capacity(limit);
    for line in reader.lines().take(limit) {
        match line {
            Ok(line) => lines.push(line),
            Err(_) => break,
        }
    }
    Ok(lines)
}

/// Write bytes to a file atomically.
///
/// The content goes to a temporary file in the destination directory which
/// is then renamed over the target, so readers see either the old or the new
/// file and never a partial write.
pub fn atomic_write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_ref())
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| "failed to sync file to disk")?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace file: {}", path.display()))?;
    Ok(())
}

/// Copy `path` to a sibling backup named `<file>.backup.<timestamp>`.
///
/// Returns the backup path.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut backup = path.with_file_name(format!("{}.backup.{}", file_name, stamp));
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{}.backup.{}.{}", file_name, stamp, n));
        n += 1;
    }

    fs::copy(path, &backup).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    tracing::debug!("backed up {} to {}", path.display(), backup.display());
    Ok(backup)
}

/// Put a backup made by [`backup_file`] back in place and remove it.
pub fn restore_backup(backup: &Path, original: &Path) -> Result<()> {
    let contents = fs::read(backup)
        .with_context(|| format!("failed to read backup: {}", backup.display()))?;
    atomic_write(original, contents)?;
    remove_file_if_exists(backup)
}

/// Remove a file, if it exists.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove file: {}", path.display()))?;
    }
    Ok(())
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}
