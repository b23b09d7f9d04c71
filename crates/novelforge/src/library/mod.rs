//! Novel content records joined with what is actually on disk.
//!
//! Fetcher implementations persist through [`NovelLibrary`]; the runner
//! reads from it to decide which children to seed.

mod model;

pub use model::{Chapter, ChapterImage, Novel, Volume};

use thiserror::Error;

use crate::db::{novel_repo, Database, DatabaseError};
use crate::error::StorageError;
use crate::storage::FileStorage;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct NovelLibrary {
    db: Database,
    storage: FileStorage,
}

impl NovelLibrary {
    pub fn new(db: Database, storage: FileStorage) -> Self {
        Self { db, storage }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Stores a novel, keyed by URL. The returned copy carries the stored id.
    pub fn save_novel(&self, novel: &Novel) -> Result<Novel, LibraryError> {
        let id = self.db.with_conn(|conn| novel_repo::upsert_novel(conn, novel))?;
        Ok(Novel {
            id,
            ..novel.clone()
        })
    }

    pub fn save_volume(&self, volume: &Volume) -> Result<Volume, LibraryError> {
        let id = self.db.with_conn(|conn| novel_repo::upsert_volume(conn, volume))?;
        Ok(Volume {
            id,
            ..volume.clone()
        })
    }

    pub fn save_chapter(&self, chapter: &Chapter) -> Result<Chapter, LibraryError> {
        let id = self
            .db
            .with_conn(|conn| novel_repo::upsert_chapter(conn, chapter))?;
        let mut saved = Chapter {
            id,
            ..chapter.clone()
        };
        saved.is_available = self.is_chapter_available(&saved);
        Ok(saved)
    }

    pub fn save_image(&self, image: &ChapterImage) -> Result<ChapterImage, LibraryError> {
        let id = self.db.with_conn(|conn| novel_repo::upsert_image(conn, image))?;
        let mut saved = ChapterImage {
            id,
            ..image.clone()
        };
        saved.is_available = self.is_image_available(&saved);
        Ok(saved)
    }

    pub fn write_chapter_body(&self, chapter: &Chapter, body: &str) -> Result<(), LibraryError> {
        self.storage
            .write_chapter(&chapter.novel_id, chapter.serial, body)?;
        Ok(())
    }

    pub fn write_image(&self, image: &ChapterImage, content: &[u8]) -> Result<(), LibraryError> {
        let path = self.storage.image_path(&image.novel_id, &image.id);
        self.storage.write_atomic(&path, content)?;
        Ok(())
    }

    pub fn write_cover(&self, novel: &Novel, content: &[u8]) -> Result<(), LibraryError> {
        let path = self.storage.cover_path(&novel.id);
        self.storage.write_atomic(&path, content)?;
        Ok(())
    }

    /// Deletes a novel record (cascading to its content rows and artifacts)
    /// and its output directory.
    pub fn delete_novel(&self, novel_id: &str) -> Result<bool, LibraryError> {
        let deleted = self
            .db
            .with_conn(|conn| novel_repo::delete_novel(conn, novel_id))?;
        self.storage.remove_novel_dir(novel_id)?;
        Ok(deleted)
    }

    pub fn novel(&self, id: &str) -> Result<Option<Novel>, LibraryError> {
        Ok(self.db.with_conn(|conn| novel_repo::find_novel(conn, id))?)
    }

    pub fn novel_by_url(&self, url: &str) -> Result<Option<Novel>, LibraryError> {
        Ok(self
            .db
            .with_conn(|conn| novel_repo::find_novel_by_url(conn, url))?)
    }

    pub fn volume(&self, id: &str) -> Result<Option<Volume>, LibraryError> {
        Ok(self.db.with_conn(|conn| novel_repo::find_volume(conn, id))?)
    }

    pub fn volumes(&self, novel_id: &str) -> Result<Vec<Volume>, LibraryError> {
        Ok(self
            .db
            .with_conn(|conn| novel_repo::volumes_of_novel(conn, novel_id))?)
    }

    pub fn chapter(&self, id: &str) -> Result<Option<Chapter>, LibraryError> {
        let chapter = self.db.with_conn(|conn| novel_repo::find_chapter(conn, id))?;
        Ok(chapter.map(|c| self.with_chapter_availability(c)))
    }

    pub fn chapters_of_volume(&self, volume_id: &str) -> Result<Vec<Chapter>, LibraryError> {
        let chapters = self
            .db
            .with_conn(|conn| novel_repo::chapters_of_volume(conn, volume_id))?;
        Ok(chapters
            .into_iter()
            .map(|c| self.with_chapter_availability(c))
            .collect())
    }

    pub fn chapters_of_novel(&self, novel_id: &str) -> Result<Vec<Chapter>, LibraryError> {
        let chapters = self
            .db
            .with_conn(|conn| novel_repo::chapters_of_novel(conn, novel_id))?;
        Ok(chapters
            .into_iter()
            .map(|c| self.with_chapter_availability(c))
            .collect())
    }

    pub fn chapter_body(&self, chapter: &Chapter) -> Result<String, LibraryError> {
        Ok(self
            .storage
            .read_chapter(&chapter.novel_id, chapter.serial)?)
    }

    pub fn image(&self, id: &str) -> Result<Option<ChapterImage>, LibraryError> {
        let image = self.db.with_conn(|conn| novel_repo::find_image(conn, id))?;
        Ok(image.map(|i| self.with_image_availability(i)))
    }

    pub fn images_of_chapter(&self, chapter_id: &str) -> Result<Vec<ChapterImage>, LibraryError> {
        let images = self
            .db
            .with_conn(|conn| novel_repo::images_of_chapter(conn, chapter_id))?;
        Ok(images
            .into_iter()
            .map(|i| self.with_image_availability(i))
            .collect())
    }

    /// Images of a chapter whose file is not on disk yet.
    pub fn pending_images(&self, chapter_id: &str) -> Result<Vec<ChapterImage>, LibraryError> {
        Ok(self
            .images_of_chapter(chapter_id)?
            .into_iter()
            .filter(|i| !i.is_available)
            .collect())
    }

    pub fn is_chapter_available(&self, chapter: &Chapter) -> bool {
        self.storage
            .chapter_path(&chapter.novel_id, chapter.serial)
            .is_file()
    }

    pub fn is_image_available(&self, image: &ChapterImage) -> bool {
        self.storage.image_path(&image.novel_id, &image.id).is_file()
    }

    fn with_chapter_availability(&self, mut chapter: Chapter) -> Chapter {
        chapter.is_available = self.is_chapter_available(&chapter);
        chapter
    }

    fn with_image_availability(&self, mut image: ChapterImage) -> ChapterImage {
        image.is_available = self.is_image_available(&image);
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> (TempDir, NovelLibrary) {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let library = NovelLibrary::new(db, FileStorage::new(temp.path()));
        (temp, library)
    }

    #[test]
    fn test_chapter_availability_follows_disk() {
        let (_temp, library) = library();
        let novel = library
            .save_novel(&Novel::new("https://example.com/n/1", "Novel"))
            .unwrap();
        let volume = library.save_volume(&Volume::new(&novel.id, 1, "")).unwrap();
        let chapter = library
            .save_chapter(&Chapter::new(&volume, 1, "https://example.com/c/1", "One"))
            .unwrap();
        assert!(!chapter.is_available);

        library.write_chapter_body(&chapter, "<p>body</p>").unwrap();
        let chapter = library.chapter(&chapter.id).unwrap().unwrap();
        assert!(chapter.is_available);
        assert_eq!(library.chapter_body(&chapter).unwrap(), "<p>body</p>");
    }

    #[test]
    fn test_pending_images() {
        let (_temp, library) = library();
        let novel = library
            .save_novel(&Novel::new("https://example.com/n/2", "Novel"))
            .unwrap();
        let volume = library.save_volume(&Volume::new(&novel.id, 1, "")).unwrap();
        let chapter = library
            .save_chapter(&Chapter::new(&volume, 1, "https://example.com/c/1", ""))
            .unwrap();
        let a = library
            .save_image(&ChapterImage::new(&chapter, "https://example.com/a.jpg"))
            .unwrap();
        let b = library
            .save_image(&ChapterImage::new(&chapter, "https://example.com/b.jpg"))
            .unwrap();

        library.write_image(&a, b"jpeg").unwrap();
        let pending: Vec<_> = library
            .pending_images(&chapter.id)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(pending, vec![b.id]);
    }

    #[test]
    fn test_delete_novel_removes_directory() {
        let (_temp, library) = library();
        let novel = library
            .save_novel(&Novel::new("https://example.com/n/3", "Novel"))
            .unwrap();
        library.write_cover(&novel, b"cover").unwrap();
        assert!(library.storage().novel_dir(&novel.id).exists());

        assert!(library.delete_novel(&novel.id).unwrap());
        assert!(library.novel(&novel.id).unwrap().is_none());
        assert!(!library.storage().novel_dir(&novel.id).exists());
    }
}
