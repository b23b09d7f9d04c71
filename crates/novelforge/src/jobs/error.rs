use thiserror::Error;

use crate::db::DatabaseError;

/// Errors surfaced by [`JobService`](super::JobService) to its callers.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No crawler available for '{0}'")]
    NoCrawler(String),

    #[error("User '{user_id}' may not modify job '{job_id}'")]
    Forbidden { user_id: String, job_id: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Parent job '{0}' is already finished")]
    ParentFinished(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for JobError {
    fn from(e: rusqlite::Error) -> Self {
        JobError::Database(DatabaseError::Sqlite(e))
    }
}
