use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Novel {
    pub id: String,
    pub url: String,
    pub title: String,
    pub authors: Option<String>,
    pub synopsis: Option<String>,
    pub cover_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Novel {
    pub fn new(url: &str, title: &str) -> Self {
        let now = crate::clock::now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            title: title.to_string(),
            authors: None,
            synopsis: None,
            cover_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub novel_id: String,
    pub serial: i64,
    pub title: String,
}

impl Volume {
    pub fn new(novel_id: &str, serial: i64, title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            novel_id: novel_id.to_string(),
            serial,
            title: title.to_string(),
        }
    }
}

/// A chapter record. `is_available` reflects whether its body is on disk
/// and is filled in by the library, not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub novel_id: String,
    pub volume_id: String,
    pub serial: i64,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub is_available: bool,
}

impl Chapter {
    pub fn new(volume: &Volume, serial: i64, url: &str, title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            novel_id: volume.novel_id.clone(),
            volume_id: volume.id.clone(),
            serial,
            url: url.to_string(),
            title: title.to_string(),
            is_available: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterImage {
    pub id: String,
    pub novel_id: String,
    pub chapter_id: String,
    pub url: String,
    #[serde(default)]
    pub is_available: bool,
}

impl ChapterImage {
    pub fn new(chapter: &Chapter, url: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            novel_id: chapter.novel_id.clone(),
            chapter_id: chapter.id.clone(),
            url: url.to_string(),
            is_available: false,
        }
    }
}
