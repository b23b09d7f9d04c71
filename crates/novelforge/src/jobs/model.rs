//! Job data model: the tagged job variants, status/priority enums and the
//! per-variant `extra` payload.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::artifact::OutputFormat;
use crate::db::value::{impl_text_column, ParseEnumError};

use super::error::JobError;

// ============================================================================
// JobType
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Novel,
    FullNovel,
    NovelBatch,
    FullNovelBatch,
    Volume,
    VolumeBatch,
    Chapter,
    ChapterBatch,
    Image,
    ImageBatch,
    Artifact,
    ArtifactBatch,
}

impl JobType {
    pub const ALL: [JobType; 12] = [
        JobType::Novel,
        JobType::FullNovel,
        JobType::NovelBatch,
        JobType::FullNovelBatch,
        JobType::Volume,
        JobType::VolumeBatch,
        JobType::Chapter,
        JobType::ChapterBatch,
        JobType::Image,
        JobType::ImageBatch,
        JobType::Artifact,
        JobType::ArtifactBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Novel => "NOVEL",
            JobType::FullNovel => "FULL_NOVEL",
            JobType::NovelBatch => "NOVEL_BATCH",
            JobType::FullNovelBatch => "FULL_NOVEL_BATCH",
            JobType::Volume => "VOLUME",
            JobType::VolumeBatch => "VOLUME_BATCH",
            JobType::Chapter => "CHAPTER",
            JobType::ChapterBatch => "CHAPTER_BATCH",
            JobType::Image => "IMAGE",
            JobType::ImageBatch => "IMAGE_BATCH",
            JobType::Artifact => "ARTIFACT",
            JobType::ArtifactBatch => "ARTIFACT_BATCH",
        }
    }

    /// Types whose input is one or more novel URLs.
    pub fn takes_urls(&self) -> bool {
        matches!(
            self,
            JobType::Novel | JobType::FullNovel | JobType::NovelBatch | JobType::FullNovelBatch
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("job type", s))
    }
}

impl_text_column!(JobType);

// ============================================================================
// JobStatus
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELED" => Ok(JobStatus::Canceled),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

impl_text_column!(JobStatus);

// ============================================================================
// JobPriority
// ============================================================================

/// Pick priority. Stored as its integer value so `ORDER BY priority DESC`
/// works directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl JobPriority {
    pub fn value(&self) -> i64 {
        *self as i64
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(JobPriority::Low),
            1 => Some(JobPriority::Normal),
            2 => Some(JobPriority::High),
            _ => None,
        }
    }
}

impl ToSql for JobPriority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.value()))
    }
}

impl FromSql for JobPriority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        JobPriority::from_value(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

// ============================================================================
// JobExtra
// ============================================================================

/// Type-specific inputs of a job plus the outputs it records for its
/// dependents (`novel_id`, `artifact_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapter_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
}

impl JobExtra {
    pub fn with_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Checks that the fields required by `job_type` are present.
    pub fn validate_for(&self, job_type: JobType) -> Result<(), JobError> {
        let missing = |field: &str| {
            Err(JobError::InvalidInput(format!(
                "{} job requires '{}'",
                job_type, field
            )))
        };

        match job_type {
            JobType::Novel | JobType::FullNovel => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return missing("url");
                }
            }
            JobType::NovelBatch | JobType::FullNovelBatch => {
                if self.urls.iter().all(|u| u.trim().is_empty()) {
                    return missing("urls");
                }
            }
            JobType::Volume => {
                if self.volume_id.is_none() {
                    return missing("volume_id");
                }
            }
            JobType::Chapter => {
                if self.chapter_id.is_none() {
                    return missing("chapter_id");
                }
            }
            JobType::Image => {
                if self.image_id.is_none() {
                    return missing("image_id");
                }
            }
            JobType::Artifact => {
                if self.novel_id.is_none() {
                    return missing("novel_id");
                }
                if self.format.is_none() {
                    return missing("format");
                }
            }
            JobType::ArtifactBatch => {
                if self.novel_id.is_none() {
                    return missing("novel_id");
                }
                if self.formats.is_empty() {
                    return missing("formats");
                }
            }
            // Batch jobs over ids may legitimately be empty.
            JobType::VolumeBatch | JobType::ChapterBatch | JobType::ImageBatch => {}
        }
        Ok(())
    }

    /// The URLs this payload refers to, trimmed and deduplicated in order.
    pub fn unique_urls(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.url
            .iter()
            .chain(self.urls.iter())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect()
    }

    /// Copy of the payload without the outputs a previous run recorded.
    pub fn inputs_only(&self, job_type: JobType) -> Self {
        let mut extra = self.clone();
        extra.artifact_id = None;
        extra.novel_title = None;
        if matches!(job_type, JobType::Novel | JobType::FullNovel) {
            extra.novel_id = None;
        }
        extra
    }
}

impl ToSql for JobExtra {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for JobExtra {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ============================================================================
// Job
// ============================================================================

/// One unit of work in the job tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub parent_job_id: Option<String>,
    pub depends_on: Option<String>,
    pub job_type: JobType,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub is_done: bool,
    pub done: i64,
    pub failed: i64,
    pub total: i64,
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub extra: JobExtra,
}

impl Job {
    pub fn is_root(&self) -> bool {
        self.parent_job_id.is_none()
    }

    /// Completion ratio in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total <= 0 {
            return 0.0;
        }
        self.done as f64 / self.total as f64
    }
}

/// A child to be inserted by [`JobService::create_children`](super::JobService::create_children).
///
/// Ids are assigned up front so a child can depend on a sibling created in
/// the same call.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub job_type: JobType,
    pub extra: JobExtra,
    pub depends_on: Option<String>,
}

impl NewJob {
    pub fn new(job_type: JobType, extra: JobExtra) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            extra,
            depends_on: None,
        }
    }

    pub fn depending_on(mut self, job_id: &str) -> Self {
        self.depends_on = Some(job_id.to_string());
        self
    }
}

/// A job that reached a terminal status inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub job_id: String,
    pub user_id: String,
    pub parent_job_id: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
}

impl Transition {
    pub fn is_root(&self) -> bool {
        self.parent_job_id.is_none()
    }
}
