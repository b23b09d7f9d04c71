//! Disk usage measurement for the novels directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::StorageError;

/// A per-novel output directory found under `novels/`.
#[derive(Debug, Clone)]
pub struct NovelDir {
    pub novel_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Sums the sizes of all regular files below `path`. A missing directory
/// has size zero.
///
/// Asks the OS first and walks the tree itself when that is unavailable or
/// fails.
pub fn dir_size(path: &Path) -> Result<u64, StorageError> {
    if !path.exists() {
        return Ok(0);
    }

    if let Some(size) = native_dir_size(path) {
        return Ok(size);
    }
    walk_dir_size(path)
}

/// Sums regular file sizes with GNU `find`. Returns `None` when the tool is
/// missing, exits with an error or prints something unexpected.
#[cfg(target_os = "linux")]
pub fn native_dir_size(path: &Path) -> Option<u64> {
    use std::process::Command;

    let output = Command::new("find")
        .arg(path)
        .args(["-type", "f", "-printf", "%s\\n"])
        .output()
        .ok()?;
    if !output.status.success() {
        log::debug!("find failed for {}, walking instead", path.display());
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut total = 0u64;
    for line in stdout.lines().filter(|l| !l.is_empty()) {
        total += line.trim().parse::<u64>().ok()?;
    }
    Some(total)
}

#[cfg(not(target_os = "linux"))]
pub fn native_dir_size(_path: &Path) -> Option<u64> {
    None
}

/// Directory-walk measurement used when [`native_dir_size`] gives nothing.
pub fn walk_dir_size(path: &Path) -> Result<u64, StorageError> {
    if !path.exists() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Scan {
            path: path.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| StorageError::Scan {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Lists the immediate subdirectories of `novels_dir`, oldest mtime first.
pub fn novel_dirs(novels_dir: &Path) -> Result<Vec<NovelDir>, StorageError> {
    if !novels_dir.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(novels_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| StorageError::Scan {
            path: novels_dir.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        dirs.push(NovelDir {
            novel_id: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            modified,
        });
    }

    dirs.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.novel_id.cmp(&b.novel_id)));
    Ok(dirs)
}
