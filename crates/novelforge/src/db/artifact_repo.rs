//! Artifact repository. At most one row exists per `(novel_id, format)`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::artifact::{Artifact, OutputFormat};

fn artifact_from_row(row: &Row<'_>) -> Result<Artifact, rusqlite::Error> {
    Ok(Artifact {
        id: row.get("id")?,
        novel_id: row.get("novel_id")?,
        job_id: row.get("job_id")?,
        user_id: row.get("user_id")?,
        format: row.get("format")?,
        file_name: row.get("file_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Inserts the artifact or replaces the current one for its novel and
/// format. Returns the stored row.
pub fn upsert(conn: &Connection, artifact: &Artifact) -> Result<Artifact, DatabaseError> {
    let stored = conn.query_row(
        "INSERT INTO artifacts (id, novel_id, job_id, user_id, format, file_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(novel_id, format) DO UPDATE SET
             job_id = excluded.job_id,
             user_id = excluded.user_id,
             file_name = excluded.file_name,
             updated_at = excluded.updated_at
         RETURNING *",
        params![
            artifact.id,
            artifact.novel_id,
            artifact.job_id,
            artifact.user_id,
            artifact.format,
            artifact.file_name,
            artifact.created_at,
            artifact.updated_at,
        ],
        artifact_from_row,
    )?;
    Ok(stored)
}

pub fn find(conn: &Connection, id: &str) -> Result<Option<Artifact>, DatabaseError> {
    let artifact = conn
        .query_row("SELECT * FROM artifacts WHERE id = ?1", params![id], artifact_from_row)
        .optional()?;
    Ok(artifact)
}

pub fn find_by_format(
    conn: &Connection,
    novel_id: &str,
    format: OutputFormat,
) -> Result<Option<Artifact>, DatabaseError> {
    let artifact = conn
        .query_row(
            "SELECT * FROM artifacts WHERE novel_id = ?1 AND format = ?2",
            params![novel_id, format],
            artifact_from_row,
        )
        .optional()?;
    Ok(artifact)
}

pub fn list_for_novel(conn: &Connection, novel_id: &str) -> Result<Vec<Artifact>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM artifacts WHERE novel_id = ?1 ORDER BY format ASC")?;
    let rows = stmt
        .query_map(params![novel_id], artifact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
