//! Per-job state machine.
//!
//! A picked job is re-read first. A pending job is only moved to
//! `RUNNING` and handed back to the scheduler; because its local step is
//! still outstanding it is picked again and dispatched on its type. Branch
//! types seed their children idempotently and complete their local step;
//! leaf types call a capability and then complete or fail.

mod error;
mod handlers;
mod notify;

pub use error::RunnerError;
pub use notify::Notifier;

use std::sync::Arc;

use tracing::info_span;

use crate::artifact::ArtifactService;
use crate::capability::{Binder, Fetcher};
use crate::jobs::{Job, JobService, JobStatus, Transition};
use crate::library::NovelLibrary;
use crate::signal::CancelToken;
use crate::user::UserService;

#[derive(Clone)]
pub struct JobRunner {
    jobs: JobService,
    users: UserService,
    library: NovelLibrary,
    artifacts: ArtifactService,
    fetcher: Arc<dyn Fetcher>,
    binder: Arc<dyn Binder>,
    notifier: Notifier,
}

impl JobRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: JobService,
        users: UserService,
        library: NovelLibrary,
        artifacts: ArtifactService,
        fetcher: Arc<dyn Fetcher>,
        binder: Arc<dyn Binder>,
        notifier: Notifier,
    ) -> Self {
        Self {
            jobs,
            users,
            library,
            artifacts,
            fetcher,
            binder,
            notifier,
        }
    }

    /// Runs one step of `job`. Errors other than cancellation are recorded
    /// on the job; nothing escapes to the caller. Returns the jobs a
    /// recorded failure sealed, so runners still working on them can be
    /// woken.
    pub fn process(&self, job: &Job, cancel: &CancelToken) -> Vec<Transition> {
        let _span = info_span!("job",
            job_id = %job.id,
            job_type = %job.job_type,
        )
        .entered();

        match self.step(&job.id, cancel) {
            Ok(()) => Vec::new(),
            Err(RunnerError::Aborted) => {
                log::debug!("Job {} aborted", job.id);
                Vec::new()
            }
            Err(e) => {
                log::warn!("Job {} failed: {}", job.id, e);
                match self.jobs.fail(&job.id, &e.to_string()) {
                    Ok(transitions) => {
                        self.notifier.transitions(&transitions);
                        transitions
                    }
                    Err(fail_err) => {
                        log::error!("Failed to record failure of job {}: {}", job.id, fail_err);
                        Vec::new()
                    }
                }
            }
        }
    }

    fn step(&self, job_id: &str, cancel: &CancelToken) -> Result<(), RunnerError> {
        let Some(job) = self.jobs.find(job_id)? else {
            return Ok(());
        };
        if job.is_done {
            return Ok(());
        }
        cancel.check()?;

        if job.status == JobStatus::Pending {
            if self.jobs.set_running(&job.id)? {
                log::debug!("Job {} is running", job.id);
                self.notifier.job_running(&job);
            }
            return Ok(());
        }

        job.extra
            .validate_for(job.job_type)
            .map_err(|e| RunnerError::Invalid(e.to_string()))?;
        self.dispatch(&job, cancel)
    }

    /// Completes the local step and sends reports for what finished.
    fn complete(&self, job: &Job) -> Result<Vec<Transition>, RunnerError> {
        let transitions = self.jobs.increment(&job.id)?;
        self.notifier.transitions(&transitions);
        Ok(transitions)
    }
}
