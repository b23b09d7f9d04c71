//! Tree-aware job operations.
//!
//! Every mutation runs in one transaction. Counter roll-up walks the
//! ancestor chain with a recursive CTE, and jobs that reach
//! `done == total` are finalised in the same transaction. Each mutation
//! returns the jobs that became terminal so callers can notify.

use std::sync::Arc;

use rusqlite::Connection;

use super::error::JobError;
use super::model::{Job, JobExtra, JobStatus, JobType, NewJob, Transition};
use crate::capability::Fetcher;
use crate::clock::now_millis;
use crate::db::job_repo::{self, JobFilter};
use crate::db::Database;
use crate::user::{tier_priority, User};

/// Longest error text stored on a job.
pub const MAX_ERROR_LEN: usize = 512;

pub const DEFAULT_CANCEL_REASON: &str = "Canceled by user";

/// Cuts `message` to at most [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[derive(Clone)]
pub struct JobService {
    db: Database,
    fetcher: Arc<dyn Fetcher>,
}

impl JobService {
    pub fn new(db: Database, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { db, fetcher }
    }

    /// Creates a job owned by `user`. With a parent, the job joins that
    /// tree and every ancestor's `total` grows by one.
    pub fn create(
        &self,
        user: &User,
        job_type: JobType,
        extra: JobExtra,
        parent_id: Option<&str>,
        depends_on: Option<&str>,
    ) -> Result<Job, JobError> {
        extra.validate_for(job_type)?;
        if job_type.takes_urls() {
            for url in extra.unique_urls() {
                validate_url(&url)?;
                self.fetcher
                    .check_url(&url)
                    .map_err(|_| JobError::NoCrawler(url.clone()))?;
            }
        }

        let now = now_millis();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            parent_job_id: parent_id.map(str::to_string),
            depends_on: depends_on.map(str::to_string),
            job_type,
            priority: tier_priority(user.tier),
            status: JobStatus::Pending,
            is_done: false,
            done: 0,
            failed: 0,
            total: 1,
            error: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
            extra,
        };

        self.db.with_tx(|tx| {
            if let Some(parent_id) = parent_id {
                let parent = job_repo::find(tx, parent_id)?
                    .ok_or_else(|| JobError::NotFound(parent_id.to_string()))?;
                if !user.can_manage(&parent.user_id) {
                    return Err(JobError::Forbidden {
                        user_id: user.id.clone(),
                        job_id: parent.id,
                    });
                }
                if parent.is_done {
                    return Err(JobError::ParentFinished(parent.id));
                }
            }
            if let Some(dep_id) = depends_on {
                check_sibling(tx, dep_id, parent_id)?;
            }

            job_repo::insert(tx, &job)?;
            job_repo::adjust_ancestors(tx, &job.id, 0, 1, 0, now)?;
            Ok(())
        })?;

        log::info!("Created {} job {} for user {}", job.job_type, job.id, job.user_id);
        Ok(job)
    }

    /// Inserts children of a running job in one transaction. Children take
    /// the parent's owner and priority. A child may depend on an existing
    /// child or on another child of the same call.
    pub fn create_children(&self, parent_id: &str, children: Vec<NewJob>) -> Result<Vec<Job>, JobError> {
        if children.is_empty() {
            return Ok(Vec::new());
        }
        for child in &children {
            child.extra.validate_for(child.job_type)?;
        }

        let now = now_millis();
        self.db.with_tx(|tx| {
            let parent = job_repo::find(tx, parent_id)?
                .ok_or_else(|| JobError::NotFound(parent_id.to_string()))?;
            if parent.is_done {
                return Err(JobError::ParentFinished(parent.id));
            }

            let mut created = Vec::with_capacity(children.len());
            for child in children {
                if let Some(ref dep_id) = child.depends_on {
                    let in_batch = created.iter().any(|j: &Job| &j.id == dep_id);
                    if !in_batch {
                        check_sibling(tx, dep_id, Some(parent_id))?;
                    }
                }
                let job = Job {
                    id: child.id,
                    user_id: parent.user_id.clone(),
                    parent_job_id: Some(parent.id.clone()),
                    depends_on: child.depends_on,
                    job_type: child.job_type,
                    priority: parent.priority,
                    status: JobStatus::Pending,
                    is_done: false,
                    done: 0,
                    failed: 0,
                    total: 1,
                    error: None,
                    started_at: None,
                    finished_at: None,
                    created_at: now,
                    updated_at: now,
                    extra: child.extra,
                };
                job_repo::insert(tx, &job)?;
                created.push(job);
            }

            if let Some(first) = created.first() {
                job_repo::adjust_ancestors(tx, &first.id, 0, created.len() as i64, 0, now)?;
            }
            log::debug!("Seeded {} children under job {}", created.len(), parent.id);
            Ok(created)
        })
    }

    /// Creates a fresh root job from another job's inputs.
    pub fn replay(&self, user: &User, id: &str) -> Result<Job, JobError> {
        let original = self.get(id)?;
        if !user.can_manage(&original.user_id) {
            return Err(JobError::Forbidden {
                user_id: user.id.clone(),
                job_id: original.id,
            });
        }
        let extra = original.extra.inputs_only(original.job_type);
        let job = self.create(user, original.job_type, extra, None, None)?;
        log::info!("Replayed job {} as {}", original.id, job.id);
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        self.find(id)?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn find(&self, id: &str) -> Result<Option<Job>, JobError> {
        Ok(self.db.with_conn(|conn| job_repo::find(conn, id))?)
    }

    pub fn children(&self, id: &str) -> Result<Vec<Job>, JobError> {
        Ok(self.db.with_conn(|conn| job_repo::children(conn, id))?)
    }

    /// Lists jobs newest first. Without `parent_job_id` only roots match.
    pub fn list(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), JobError> {
        Ok(self.db.with_conn(|conn| job_repo::query(conn, filter))?)
    }

    pub fn pick_runnable(&self, in_flight: &[String]) -> Result<Option<Job>, JobError> {
        Ok(self
            .db
            .with_conn(|conn| job_repo::pick_runnable(conn, in_flight))?)
    }

    /// Cancels a job and its unfinished descendants. A missing or finished
    /// job is left alone. The returned transitions include every job
    /// cancelled here, so in-flight runners can be woken.
    pub fn cancel(
        &self,
        user: &User,
        id: &str,
        reason: Option<&str>,
    ) -> Result<Vec<Transition>, JobError> {
        let Some(job) = self.find(id)? else {
            return Ok(Vec::new());
        };
        if !user.can_manage(&job.user_id) {
            return Err(JobError::Forbidden {
                user_id: user.id.clone(),
                job_id: job.id,
            });
        }
        if job.is_done {
            return Ok(Vec::new());
        }

        let reason = truncate_error(reason.unwrap_or(DEFAULT_CANCEL_REASON));
        let now = now_millis();
        let transitions = self.db.with_tx(|tx| {
            let Some(job) = job_repo::find(tx, id)? else {
                return Ok(Vec::new());
            };
            let sealed = seal_subtree(tx, &job, JobStatus::Canceled, &reason, 0, now)?;
            cascade_dependents(tx, sealed, now)
        })?;

        log::info!(
            "Job {} canceled by {} ({} jobs finished)",
            id,
            user.id,
            transitions.len()
        );
        Ok(transitions)
    }

    /// Deletes a job and its subtree and shrinks every ancestor's counters
    /// by the removed amounts. Missing jobs are a no-op.
    pub fn delete(&self, user: &User, id: &str) -> Result<Vec<Transition>, JobError> {
        let Some(job) = self.find(id)? else {
            return Ok(Vec::new());
        };
        if !user.can_manage(&job.user_id) {
            return Err(JobError::Forbidden {
                user_id: user.id.clone(),
                job_id: job.id,
            });
        }
        let transitions = self.purge(id)?;
        log::info!("Job {} deleted by {}", id, user.id);
        Ok(transitions)
    }

    /// Deletes a subtree without an ownership check.
    pub(crate) fn purge(&self, id: &str) -> Result<Vec<Transition>, JobError> {
        let now = now_millis();
        self.db.with_tx(|tx| {
            let Some(job) = job_repo::find(tx, id)? else {
                return Ok(Vec::new());
            };
            let ancestors = job_repo::ancestors(tx, id)?;
            job_repo::adjust_ancestors(tx, id, -job.done, -job.total, -job.failed, now)?;
            job_repo::delete(tx, id)?;

            let finalised = job_repo::finalise_ready(tx, &ancestors, now)?;
            cascade_dependents(tx, finalised, now)
        })
    }

    pub(crate) fn stale_canceled(&self, cutoff: i64) -> Result<Vec<String>, JobError> {
        Ok(self
            .db
            .with_conn(|conn| job_repo::stale_canceled_roots(conn, cutoff))?)
    }

    /// Moves a pending job to `RUNNING`. Returns false when it was not pending.
    pub fn set_running(&self, id: &str) -> Result<bool, JobError> {
        let now = now_millis();
        Ok(self.db.with_conn(|conn| job_repo::mark_running(conn, id, now))?)
    }

    /// Completes the job's local step and rolls it up to every ancestor.
    /// Does nothing when the job is finished or its step already counted.
    pub fn increment(&self, id: &str) -> Result<Vec<Transition>, JobError> {
        let now = now_millis();
        self.db.with_tx(|tx| {
            if !job_repo::local_step_pending(tx, id)? {
                return Ok(Vec::new());
            }
            job_repo::increment_local(tx, id, now)?;

            let mut chain = Vec::new();
            if let Some(job) = job_repo::find(tx, id)? {
                chain.push(job);
            }
            chain.extend(job_repo::ancestors(tx, id)?);
            let finalised = job_repo::finalise_ready(tx, &chain, now)?;
            cascade_dependents(tx, finalised, now)
        })
    }

    /// Seals the job as `FAILED`, cancels its unfinished descendants and
    /// rolls the remainder up to its ancestors.
    pub fn fail(&self, id: &str, error: &str) -> Result<Vec<Transition>, JobError> {
        let error = truncate_error(error);
        let now = now_millis();
        self.db.with_tx(|tx| {
            let Some(job) = job_repo::find(tx, id)? else {
                return Ok(Vec::new());
            };
            let sealed = seal_subtree(tx, &job, JobStatus::Failed, &error, 1, now)?;
            cascade_dependents(tx, sealed, now)
        })
    }

    /// Stores outputs a job recorded in its payload.
    pub fn record_extra(&self, id: &str, extra: &JobExtra) -> Result<(), JobError> {
        let now = now_millis();
        Ok(self
            .db
            .with_conn(|conn| job_repo::update_extra(conn, id, extra, now))?)
    }
}

fn validate_url(url: &str) -> Result<(), JobError> {
    let invalid = |reason: &str| JobError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn check_sibling(conn: &Connection, dep_id: &str, parent_id: Option<&str>) -> Result<(), JobError> {
    let dep = job_repo::find(conn, dep_id)?
        .ok_or_else(|| JobError::NotFound(dep_id.to_string()))?;
    if dep.parent_job_id.as_deref() != parent_id {
        return Err(JobError::InvalidInput(format!(
            "dependency {} is not a sibling",
            dep_id
        )));
    }
    Ok(())
}

/// Seals `job` with `status` and its unfinished descendants as `CANCELED`,
/// then adds the job's outstanding remainder to every ancestor's `done`
/// and finalises ancestors that complete.
fn seal_subtree(
    conn: &Connection,
    job: &Job,
    status: JobStatus,
    error: &str,
    failed_delta: i64,
    now: i64,
) -> Result<Vec<Transition>, JobError> {
    if job.is_done {
        return Ok(Vec::new());
    }

    let mut transitions = job_repo::seal(
        conn,
        std::slice::from_ref(job),
        status,
        Some(error),
        failed_delta,
        now,
    )?;
    let descendants: Vec<Job> = job_repo::descendants(conn, &job.id)?
        .into_iter()
        .filter(|j| !j.is_done)
        .collect();
    transitions.extend(job_repo::seal(
        conn,
        &descendants,
        JobStatus::Canceled,
        Some(error),
        0,
        now,
    )?);

    let remainder = job.total - job.done;
    job_repo::adjust_ancestors(conn, &job.id, remainder, 0, failed_delta, now)?;
    let ancestors = job_repo::ancestors(conn, &job.id)?;
    transitions.extend(job_repo::finalise_ready(conn, &ancestors, now)?);
    Ok(transitions)
}

/// Seals every unfinished dependent of a job that ended `FAILED` or
/// `CANCELED`, transitively. Returns `transitions` with the new ones
/// appended.
fn cascade_dependents(
    conn: &Connection,
    mut transitions: Vec<Transition>,
    now: i64,
) -> Result<Vec<Transition>, JobError> {
    let mut cursor = 0;
    while cursor < transitions.len() {
        let current = transitions[cursor].clone();
        cursor += 1;
        if !matches!(current.status, JobStatus::Failed | JobStatus::Canceled) {
            continue;
        }

        let error = format!("Dependency {} did not succeed", current.job_id);
        let failed_delta = i64::from(current.status == JobStatus::Failed);
        for dependent in job_repo::pending_dependents(conn, &current.job_id)? {
            // Earlier iterations may have sealed it already.
            let Some(fresh) = job_repo::find(conn, &dependent.id)? else {
                continue;
            };
            let sealed = seal_subtree(conn, &fresh, current.status, &error, failed_delta, now)?;
            transitions.extend(sealed);
        }
    }
    Ok(transitions)
}
