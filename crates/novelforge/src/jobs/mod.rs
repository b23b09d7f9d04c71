//! The job tree: model, errors and the service that mutates it.

mod error;
mod model;
mod service;

pub use crate::db::job_repo::JobFilter;
pub use error::JobError;
pub use model::{Job, JobExtra, JobPriority, JobStatus, JobType, NewJob, Transition};
pub use service::{truncate_error, JobService, DEFAULT_CANCEL_REASON, MAX_ERROR_LEN};
