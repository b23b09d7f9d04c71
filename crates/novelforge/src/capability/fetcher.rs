use thiserror::Error;

use crate::library::{Chapter, ChapterImage, Novel};
use crate::signal::{Aborted, CancelToken};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No crawler for '{0}'")]
    NoCrawler(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    Failed(String),

    #[error("Aborted")]
    Aborted,
}

impl From<Aborted> for FetchError {
    fn from(_: Aborted) -> Self {
        FetchError::Aborted
    }
}

/// Source-site crawling. Implementations persist what they fetch (through
/// [`NovelLibrary`](crate::library::NovelLibrary)) before returning.
pub trait Fetcher: Send + Sync {
    /// Whether some crawler accepts this URL.
    fn check_url(&self, url: &str) -> Result<(), FetchError>;

    /// Fetches novel metadata, volumes, chapter list and image list.
    fn fetch_novel(&self, user_id: &str, url: &str, cancel: &CancelToken)
        -> Result<Novel, FetchError>;

    /// Fetches and stores one chapter body plus its image metadata.
    fn fetch_chapter(
        &self,
        user_id: &str,
        chapter_id: &str,
        cancel: &CancelToken,
    ) -> Result<Chapter, FetchError>;

    fn fetch_image(
        &self,
        user_id: &str,
        image_id: &str,
        cancel: &CancelToken,
    ) -> Result<ChapterImage, FetchError>;
}
