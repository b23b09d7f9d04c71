use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::OutputFormat;
use crate::signal::{Aborted, CancelToken};

#[derive(Error, Debug)]
pub enum BindError {
    #[error("Format '{0}' is not supported")]
    Unsupported(OutputFormat),

    #[error("Format '{0}' needs an EPUB input")]
    MissingEpub(OutputFormat),

    #[error("Binding failed: {0}")]
    Failed(String),

    #[error("Aborted")]
    Aborted,
}

impl From<Aborted> for BindError {
    fn from(_: Aborted) -> Self {
        BindError::Aborted
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactRequest {
    pub novel_id: String,
    pub format: OutputFormat,
    pub job_id: String,
    pub user_id: String,
    /// Bound EPUB of the same novel, for formats converted from it.
    pub epub_path: Option<PathBuf>,
}

/// Output of a binder run. The core writes it to disk and records it.
#[derive(Debug, Clone)]
pub struct BoundFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// E-book assembly and conversion.
pub trait Binder: Send + Sync {
    fn available_formats(&self) -> Vec<OutputFormat>;

    fn depends_on_epub(&self, format: OutputFormat) -> bool {
        format.depends_on_epub()
    }

    fn make_artifact(
        &self,
        request: &ArtifactRequest,
        cancel: &CancelToken,
    ) -> Result<BoundFile, BindError>;
}
