//! Novel repository: novels, volumes, chapters and chapter images.
//!
//! Upserts key on the natural unique constraints (`url`,
//! `(novel_id, serial)`, `(chapter_id, url)`) and return the id of the
//! stored row, so re-fetching a novel keeps existing ids stable.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::library::{Chapter, ChapterImage, Novel, Volume};

fn novel_from_row(row: &Row<'_>) -> Result<Novel, rusqlite::Error> {
    Ok(Novel {
        id: row.get("id")?,
        url: row.get("url")?,
        title: row.get("title")?,
        authors: row.get("authors")?,
        synopsis: row.get("synopsis")?,
        cover_url: row.get("cover_url")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn volume_from_row(row: &Row<'_>) -> Result<Volume, rusqlite::Error> {
    Ok(Volume {
        id: row.get("id")?,
        novel_id: row.get("novel_id")?,
        serial: row.get("serial")?,
        title: row.get("title")?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> Result<Chapter, rusqlite::Error> {
    Ok(Chapter {
        id: row.get("id")?,
        novel_id: row.get("novel_id")?,
        volume_id: row.get("volume_id")?,
        serial: row.get("serial")?,
        url: row.get("url")?,
        title: row.get("title")?,
        is_available: false,
    })
}

fn image_from_row(row: &Row<'_>) -> Result<ChapterImage, rusqlite::Error> {
    Ok(ChapterImage {
        id: row.get("id")?,
        novel_id: row.get("novel_id")?,
        chapter_id: row.get("chapter_id")?,
        url: row.get("url")?,
        is_available: false,
    })
}

// ============================================================================
// Novels
// ============================================================================

/// Inserts or updates a novel by URL. Returns the stored id.
pub fn upsert_novel(conn: &Connection, novel: &Novel) -> Result<String, DatabaseError> {
    let id = conn.query_row(
        "INSERT INTO novels (id, url, title, authors, synopsis, cover_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(url) DO UPDATE SET
             title = excluded.title,
             authors = excluded.authors,
             synopsis = excluded.synopsis,
             cover_url = excluded.cover_url,
             updated_at = excluded.updated_at
         RETURNING id",
        params![
            novel.id,
            novel.url,
            novel.title,
            novel.authors,
            novel.synopsis,
            novel.cover_url,
            novel.created_at,
            novel.updated_at,
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_novel(conn: &Connection, id: &str) -> Result<Option<Novel>, DatabaseError> {
    let novel = conn
        .query_row("SELECT * FROM novels WHERE id = ?1", params![id], novel_from_row)
        .optional()?;
    Ok(novel)
}

pub fn find_novel_by_url(conn: &Connection, url: &str) -> Result<Option<Novel>, DatabaseError> {
    let novel = conn
        .query_row("SELECT * FROM novels WHERE url = ?1", params![url], novel_from_row)
        .optional()?;
    Ok(novel)
}

/// Deletes a novel with its volumes, chapters, images and artifacts.
pub fn delete_novel(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM novels WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ============================================================================
// Volumes
// ============================================================================

pub fn upsert_volume(conn: &Connection, volume: &Volume) -> Result<String, DatabaseError> {
    let id = conn.query_row(
        "INSERT INTO volumes (id, novel_id, serial, title) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(novel_id, serial) DO UPDATE SET title = excluded.title
         RETURNING id",
        params![volume.id, volume.novel_id, volume.serial, volume.title],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_volume(conn: &Connection, id: &str) -> Result<Option<Volume>, DatabaseError> {
    let volume = conn
        .query_row("SELECT * FROM volumes WHERE id = ?1", params![id], volume_from_row)
        .optional()?;
    Ok(volume)
}

pub fn volumes_of_novel(conn: &Connection, novel_id: &str) -> Result<Vec<Volume>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM volumes WHERE novel_id = ?1 ORDER BY serial ASC")?;
    let rows = stmt
        .query_map(params![novel_id], volume_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// Chapters
// ============================================================================

pub fn upsert_chapter(conn: &Connection, chapter: &Chapter) -> Result<String, DatabaseError> {
    let id = conn.query_row(
        "INSERT INTO chapters (id, novel_id, volume_id, serial, url, title)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(novel_id, serial) DO UPDATE SET
             volume_id = excluded.volume_id,
             url = excluded.url,
             title = excluded.title
         RETURNING id",
        params![
            chapter.id,
            chapter.novel_id,
            chapter.volume_id,
            chapter.serial,
            chapter.url,
            chapter.title,
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_chapter(conn: &Connection, id: &str) -> Result<Option<Chapter>, DatabaseError> {
    let chapter = conn
        .query_row("SELECT * FROM chapters WHERE id = ?1", params![id], chapter_from_row)
        .optional()?;
    Ok(chapter)
}

pub fn chapters_of_volume(
    conn: &Connection,
    volume_id: &str,
) -> Result<Vec<Chapter>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM chapters WHERE volume_id = ?1 ORDER BY serial ASC")?;
    let rows = stmt
        .query_map(params![volume_id], chapter_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn chapters_of_novel(conn: &Connection, novel_id: &str) -> Result<Vec<Chapter>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM chapters WHERE novel_id = ?1 ORDER BY serial ASC")?;
    let rows = stmt
        .query_map(params![novel_id], chapter_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// Images
// ============================================================================

pub fn upsert_image(conn: &Connection, image: &ChapterImage) -> Result<String, DatabaseError> {
    let id = conn.query_row(
        "INSERT INTO chapter_images (id, novel_id, chapter_id, url) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chapter_id, url) DO UPDATE SET url = excluded.url
         RETURNING id",
        params![image.id, image.novel_id, image.chapter_id, image.url],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_image(conn: &Connection, id: &str) -> Result<Option<ChapterImage>, DatabaseError> {
    let image = conn
        .query_row(
            "SELECT * FROM chapter_images WHERE id = ?1",
            params![id],
            image_from_row,
        )
        .optional()?;
    Ok(image)
}

pub fn images_of_chapter(
    conn: &Connection,
    chapter_id: &str,
) -> Result<Vec<ChapterImage>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM chapter_images WHERE chapter_id = ?1 ORDER BY rowid ASC")?;
    let rows = stmt
        .query_map(params![chapter_id], image_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
