use thiserror::Error;

use crate::artifact::Artifact;
use crate::jobs::Job;
use crate::user::User;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Transactional notifications. Failures never affect job outcomes.
pub trait Mailer: Send + Sync {
    fn send_job_running(&self, user: &User, job: &Job) -> Result<(), MailError>;

    /// Sent when a root job reaches a terminal status.
    fn send_job_report(&self, user: &User, job: &Job) -> Result<(), MailError>;

    fn send_artifact_ready(
        &self,
        user: &User,
        job: &Job,
        artifact: &Artifact,
    ) -> Result<(), MailError>;
}

/// Mailer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMailer;

impl Mailer for NoopMailer {
    fn send_job_running(&self, user: &User, job: &Job) -> Result<(), MailError> {
        log::debug!("Mail suppressed: job {} running for {}", job.id, user.email);
        Ok(())
    }

    fn send_job_report(&self, user: &User, job: &Job) -> Result<(), MailError> {
        log::debug!(
            "Mail suppressed: job {} finished as {} for {}",
            job.id,
            job.status,
            user.email
        );
        Ok(())
    }

    fn send_artifact_ready(
        &self,
        user: &User,
        job: &Job,
        artifact: &Artifact,
    ) -> Result<(), MailError> {
        log::debug!(
            "Mail suppressed: {} artifact of job {} ready for {}",
            artifact.format,
            job.id,
            user.email
        );
        Ok(())
    }
}
