//! On-disk layout under the output directory.
//!
//! ```text
//! novels/{novel_id}/cover.jpg
//! novels/{novel_id}/chapters/{serial:06}.zst
//! novels/{novel_id}/images/{image_id}.jpg
//! novels/{novel_id}/artifacts/{file_name}
//! ```

pub mod codec;
pub mod disk;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn novels_dir(&self) -> PathBuf {
        self.output_directory.join("novels")
    }

    pub fn novel_dir(&self, novel_id: &str) -> PathBuf {
        self.novels_dir().join(novel_id)
    }

    pub fn cover_path(&self, novel_id: &str) -> PathBuf {
        self.novel_dir(novel_id).join("cover.jpg")
    }

    pub fn chapter_path(&self, novel_id: &str, serial: i64) -> PathBuf {
        self.novel_dir(novel_id)
            .join("chapters")
            .join(format!("{:06}.zst", serial))
    }

    pub fn image_path(&self, novel_id: &str, image_id: &str) -> PathBuf {
        self.novel_dir(novel_id)
            .join("images")
            .join(format!("{}.jpg", image_id))
    }

    pub fn artifacts_dir(&self, novel_id: &str) -> PathBuf {
        self.novel_dir(novel_id).join("artifacts")
    }

    /// Path of an artifact file. Rejects names that would escape the
    /// artifacts directory.
    pub fn artifact_path(&self, novel_id: &str, file_name: &str) -> Result<PathBuf, StorageError> {
        let plain = Path::new(file_name)
            .file_name()
            .map(|n| n == file_name)
            .unwrap_or(false);
        if file_name.is_empty() || !plain || file_name.starts_with('.') {
            return Err(StorageError::InvalidFileName(file_name.to_string()));
        }
        Ok(self.artifacts_dir(novel_id).join(file_name))
    }

    /// Writes `content` to `path` through a temporary sibling file and a
    /// rename, so readers see either the old or the new file.
    pub fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidFileName(path.display().to_string()))?;
        ensure_directory(dir)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidFileName(path.display().to_string()))?;
        let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let write = || -> Result<(), StorageError> {
            let mut file = std::fs::File::create(&tmp_path).map_err(|e| StorageError::WriteFile {
                path: tmp_path.clone(),
                source: e,
            })?;
            file.write_all(content)
                .and_then(|_| file.sync_all())
                .map_err(|e| StorageError::WriteFile {
                    path: tmp_path.clone(),
                    source: e,
                })?;
            move_file(&tmp_path, path)
        };

        let result = write();
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result
    }

    pub fn write_chapter(
        &self,
        novel_id: &str,
        serial: i64,
        body: &str,
    ) -> Result<PathBuf, StorageError> {
        let path = self.chapter_path(novel_id, serial);
        self.write_atomic(&path, &codec::compress(body)?)?;
        Ok(path)
    }

    pub fn read_chapter(&self, novel_id: &str, serial: i64) -> Result<String, StorageError> {
        let path = self.chapter_path(novel_id, serial);
        let data = std::fs::read(&path).map_err(|e| StorageError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        codec::decompress(&data)
    }

    /// Removes a file, treating a missing file as success.
    pub fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Removes a novel's whole output directory.
    pub fn remove_novel_dir(&self, novel_id: &str) -> Result<(), StorageError> {
        let path = self.novel_dir(novel_id);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove { path, source: e }),
        }
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Size in bytes of a file, or `None` when it does not exist.
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let storage = FileStorage::new("/out");
        assert_eq!(storage.cover_path("n1"), PathBuf::from("/out/novels/n1/cover.jpg"));
        assert_eq!(
            storage.chapter_path("n1", 42),
            PathBuf::from("/out/novels/n1/chapters/000042.zst")
        );
        assert_eq!(
            storage.image_path("n1", "img"),
            PathBuf::from("/out/novels/n1/images/img.jpg")
        );
        assert_eq!(
            storage.artifact_path("n1", "book.epub").unwrap(),
            PathBuf::from("/out/novels/n1/artifacts/book.epub")
        );
    }

    #[test]
    fn test_artifact_path_rejects_traversal() {
        let storage = FileStorage::new("/out");
        assert!(storage.artifact_path("n1", "../escape.epub").is_err());
        assert!(storage.artifact_path("n1", "a/b.epub").is_err());
        assert!(storage.artifact_path("n1", "").is_err());
        assert!(storage.artifact_path("n1", ".hidden").is_err());
    }

    #[test]
    fn test_write_atomic_replaces_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let path = storage.artifact_path("n1", "book.epub").unwrap();

        storage.write_atomic(&path, b"first").unwrap();
        storage.write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(storage.artifacts_dir("n1"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_chapter_round_trip() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let body = "<h1>Chapter 1</h1><p>Once upon a time</p>";

        let path = storage.write_chapter("n1", 1, body).unwrap();
        assert!(codec::is_compressed(&std::fs::read(&path).unwrap()));
        assert_eq!(storage.read_chapter("n1", 1).unwrap(), body);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        storage.write_chapter("n1", 1, "x").unwrap();

        storage.remove_novel_dir("n1").unwrap();
        assert!(!storage.novel_dir("n1").exists());
        storage.remove_novel_dir("n1").unwrap();
        storage.remove_file(&storage.cover_path("n1")).unwrap();
    }
}
