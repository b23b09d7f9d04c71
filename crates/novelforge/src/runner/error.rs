use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::capability::{BindError, FetchError};
use crate::db::DatabaseError;
use crate::jobs::JobError;
use crate::library::LibraryError;
use crate::signal::Aborted;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// Cancellation was observed. Never recorded on the job.
    #[error("Aborted")]
    Aborted,

    #[error("{0}")]
    Capability(String),

    #[error("Invalid job: {0}")]
    Invalid(String),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<Aborted> for RunnerError {
    fn from(_: Aborted) -> Self {
        RunnerError::Aborted
    }
}

impl RunnerError {
    /// Wraps a fetcher failure with what was being fetched.
    pub fn fetch(context: &str, err: FetchError) -> Self {
        match err {
            FetchError::Aborted => RunnerError::Aborted,
            other => RunnerError::Capability(format!("{}: {}", context, other)),
        }
    }

    /// Wraps a binder failure with what was being bound.
    pub fn bind(context: &str, err: BindError) -> Self {
        match err {
            BindError::Aborted => RunnerError::Aborted,
            other => RunnerError::Capability(format!("{}: {}", context, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_capability_errors_stay_aborted() {
        assert!(matches!(
            RunnerError::fetch("Chapter c1", FetchError::Aborted),
            RunnerError::Aborted
        ));
        assert!(matches!(
            RunnerError::bind("pdf", BindError::Aborted),
            RunnerError::Aborted
        ));
    }

    #[test]
    fn test_capability_message_has_context() {
        let err = RunnerError::fetch("Chapter c1", FetchError::Failed("HTTP 503".into()));
        assert_eq!(err.to_string(), "Chapter c1: Fetch failed: HTTP 503");
    }
}
