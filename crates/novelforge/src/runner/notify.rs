//! Mail notifications for job events. Failures are logged and dropped.

use std::sync::Arc;

use crate::artifact::Artifact;
use crate::capability::Mailer;
use crate::jobs::{Job, JobService, JobStatus, Transition};
use crate::user::{NotifyItem, User, UserService};

#[derive(Clone)]
pub struct Notifier {
    jobs: JobService,
    users: UserService,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(jobs: JobService, users: UserService, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            jobs,
            users,
            mailer,
        }
    }

    fn owner(&self, job: &Job, item: NotifyItem) -> Option<User> {
        match self.users.get(&job.user_id) {
            Ok(Some(user)) if user.wants(item) => Some(user),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to load owner of job {}: {}", job.id, e);
                None
            }
        }
    }

    /// A root job started running.
    pub fn job_running(&self, job: &Job) {
        if !job.is_root() {
            return;
        }
        if let Some(user) = self.owner(job, NotifyItem::JobRunning) {
            if let Err(e) = self.mailer.send_job_running(&user, job) {
                log::warn!("Failed to send running notice for job {}: {}", job.id, e);
            }
        }
    }

    /// Reports root jobs that reached `SUCCESS` or `FAILED`.
    pub fn transitions(&self, transitions: &[Transition]) {
        for transition in transitions.iter().filter(|t| t.is_root()) {
            let item = match transition.status {
                JobStatus::Success => NotifyItem::JobSuccess,
                JobStatus::Failed => NotifyItem::JobFailure,
                _ => continue,
            };
            let job = match self.jobs.find(&transition.job_id) {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Failed to reload job {}: {}", transition.job_id, e);
                    continue;
                }
            };
            if let Some(user) = self.owner(&job, item) {
                if let Err(e) = self.mailer.send_job_report(&user, &job) {
                    log::warn!("Failed to send report for job {}: {}", job.id, e);
                }
            }
        }
    }

    pub fn artifact_ready(&self, job: &Job, artifact: &Artifact) {
        if let Some(user) = self.owner(job, NotifyItem::ArtifactReady) {
            if let Err(e) = self.mailer.send_artifact_ready(&user, job, artifact) {
                log::warn!("Failed to send artifact notice for job {}: {}", job.id, e);
            }
        }
    }
}
