//! Bound e-book files and their records.

mod format;

pub use format::OutputFormat;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{artifact_repo, Database, DatabaseError};
use crate::error::StorageError;
use crate::storage::{self, FileStorage};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub novel_id: String,
    pub job_id: Option<String>,
    pub user_id: String,
    pub format: OutputFormat,
    pub file_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Artifact {
    pub fn new(
        novel_id: &str,
        job_id: Option<&str>,
        user_id: &str,
        format: OutputFormat,
        file_name: &str,
    ) -> Self {
        let now = crate::clock::now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            novel_id: novel_id.to_string(),
            job_id: job_id.map(str::to_string),
            user_id: user_id.to_string(),
            format,
            file_name: file_name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stores artifact files and keeps one current record per novel and format.
#[derive(Clone)]
pub struct ArtifactService {
    db: Database,
    storage: FileStorage,
}

impl ArtifactService {
    pub fn new(db: Database, storage: FileStorage) -> Self {
        Self { db, storage }
    }

    pub fn path(&self, artifact: &Artifact) -> Result<PathBuf, ArtifactError> {
        Ok(self
            .storage
            .artifact_path(&artifact.novel_id, &artifact.file_name)?)
    }

    pub fn is_available(&self, artifact: &Artifact) -> bool {
        self.file_size(artifact).is_some()
    }

    pub fn file_size(&self, artifact: &Artifact) -> Option<u64> {
        self.path(artifact)
            .ok()
            .and_then(|p| storage::file_size(&p))
    }

    /// Writes `content` atomically and upserts the record for
    /// `(novel_id, format)`. A replaced file with a different name is
    /// removed afterwards.
    pub fn save(&self, artifact: &Artifact, content: &[u8]) -> Result<Artifact, ArtifactError> {
        let path = self.path(artifact)?;
        self.storage.write_atomic(&path, content)?;

        let previous = self.db.with_conn(|conn| {
            artifact_repo::find_by_format(conn, &artifact.novel_id, artifact.format)
        })?;
        let stored = self
            .db
            .with_conn(|conn| artifact_repo::upsert(conn, artifact))?;

        if let Some(previous) = previous {
            if previous.file_name != stored.file_name {
                if let Ok(old_path) = self.path(&previous) {
                    if let Err(e) = self.storage.remove_file(&old_path) {
                        log::warn!("Failed to remove replaced artifact file: {}", e);
                    }
                }
            }
        }

        log::debug!(
            "Saved {} artifact for novel {} as {}",
            stored.format,
            stored.novel_id,
            stored.file_name
        );
        Ok(stored)
    }

    pub fn get(&self, id: &str) -> Result<Option<Artifact>, ArtifactError> {
        Ok(self.db.with_conn(|conn| artifact_repo::find(conn, id))?)
    }

    /// The current artifact of a novel in `format`, if any.
    pub fn current(
        &self,
        novel_id: &str,
        format: OutputFormat,
    ) -> Result<Option<Artifact>, ArtifactError> {
        Ok(self
            .db
            .with_conn(|conn| artifact_repo::find_by_format(conn, novel_id, format))?)
    }

    pub fn for_novel(&self, novel_id: &str) -> Result<Vec<Artifact>, ArtifactError> {
        Ok(self
            .db
            .with_conn(|conn| artifact_repo::list_for_novel(conn, novel_id))?)
    }
}
