//! Job repository: tree-aware operations on the `jobs` table.
//!
//! Functions take a `&Connection` so the service can compose several of
//! them inside one transaction (a `Transaction` derefs to `Connection`).
//! Every ancestor walk is a recursive CTE over `parent_job_id`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::jobs::{Job, JobExtra, JobStatus, JobType, Transition};

/// Ancestors of `?1`, nearest first (the job itself is excluded).
const ANCESTORS_CTE: &str = "WITH RECURSIVE ancestors(id, depth) AS (
        SELECT parent_job_id, 1 FROM jobs WHERE id = ?1 AND parent_job_id IS NOT NULL
        UNION ALL
        SELECT j.parent_job_id, a.depth + 1 FROM jobs j
        JOIN ancestors a ON j.id = a.id
        WHERE j.parent_job_id IS NOT NULL
    )";

/// `?1` and all of its descendants, shallowest first.
const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id, depth) AS (
        SELECT id, 0 FROM jobs WHERE id = ?1
        UNION ALL
        SELECT j.id, s.depth + 1 FROM jobs j
        JOIN subtree s ON j.parent_job_id = s.id
    )";

const JOB_COLUMNS: &str = "id, user_id, parent_job_id, depends_on, job_type, priority, status,
     is_done, done, failed, total, error, started_at, finished_at, created_at, updated_at, extra";

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub is_done: Option<bool>,
    /// Lists the children of this job. When unset only root jobs are listed.
    pub parent_job_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    Ok(Job {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        parent_job_id: row.get("parent_job_id")?,
        depends_on: row.get("depends_on")?,
        job_type: row.get("job_type")?,
        priority: row.get("priority")?,
        status: row.get("status")?,
        is_done: row.get("is_done")?,
        done: row.get("done")?,
        failed: row.get("failed")?,
        total: row.get("total")?,
        error: row.get("error")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        extra: row.get("extra")?,
    })
}

fn transition_of(job: &Job, status: JobStatus) -> Transition {
    Transition {
        job_id: job.id.clone(),
        user_id: job.user_id.clone(),
        parent_job_id: job.parent_job_id.clone(),
        job_type: job.job_type,
        status,
    }
}

fn select_jobs(conn: &Connection, sql: &str, id: &str) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![id], job_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &Job) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO jobs ({JOB_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            job.id,
            job.user_id,
            job.parent_job_id,
            job.depends_on,
            job.job_type,
            job.priority,
            job.status,
            job.is_done,
            job.done,
            job.failed,
            job.total,
            job.error,
            job.started_at,
            job.finished_at,
            job.created_at,
            job.updated_at,
            job.extra,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find(conn: &Connection, id: &str) -> Result<Option<Job>, DatabaseError> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

/// Direct children of a job in creation order.
pub fn children(conn: &Connection, id: &str) -> Result<Vec<Job>, DatabaseError> {
    select_jobs(
        conn,
        &format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE parent_job_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ),
        id,
    )
}

/// Ancestors of a job, nearest first.
pub fn ancestors(conn: &Connection, id: &str) -> Result<Vec<Job>, DatabaseError> {
    select_jobs(
        conn,
        &format!(
            "{ANCESTORS_CTE}
             SELECT {cols} FROM jobs j JOIN ancestors a ON j.id = a.id ORDER BY a.depth ASC",
            cols = prefixed_columns("j")
        ),
        id,
    )
}

/// Descendants of a job (excluding the job itself), shallowest first.
pub fn descendants(conn: &Connection, id: &str) -> Result<Vec<Job>, DatabaseError> {
    select_jobs(
        conn,
        &format!(
            "{SUBTREE_CTE}
             SELECT {cols} FROM jobs j JOIN subtree s ON j.id = s.id
             WHERE s.depth > 0 ORDER BY s.depth ASC, j.rowid ASC",
            cols = prefixed_columns("j")
        ),
        id,
    )
}

fn prefixed_columns(alias: &str) -> String {
    JOB_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Adds the given deltas to the counters of every ancestor of `id`.
///
/// `done` and `failed` are clamped to `[0, total]`; `total` never drops
/// below zero.
pub fn adjust_ancestors(
    conn: &Connection,
    id: &str,
    done_delta: i64,
    total_delta: i64,
    failed_delta: i64,
    now: i64,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        &format!(
            "{ANCESTORS_CTE}
             UPDATE jobs SET
                 total = MAX(0, total + ?3),
                 done = MAX(0, MIN(MAX(0, total + ?3), done + ?2)),
                 failed = MAX(0, MIN(MAX(0, total + ?3), failed + ?4)),
                 updated_at = ?5
             WHERE id IN (SELECT id FROM ancestors)"
        ),
        params![id, done_delta, total_delta, failed_delta, now],
    )?;
    Ok(changed)
}

/// Whether the job's own unit of work is still outstanding, i.e. its `done`
/// counter only reflects its children.
pub fn local_step_pending(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let pending = conn
        .query_row(
            "SELECT j.is_done = 0 AND j.done <= (
                 SELECT COALESCE(SUM(c.done), 0) FROM jobs c WHERE c.parent_job_id = j.id
             )
             FROM jobs j WHERE j.id = ?1",
            params![id],
            |r| r.get::<_, bool>(0),
        )
        .optional()?;
    Ok(pending.unwrap_or(false))
}

/// Completes the local step: `done += 1` on the job and every ancestor.
pub fn increment_local(conn: &Connection, id: &str, now: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET done = MIN(total, done + 1), updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    adjust_ancestors(conn, id, 1, 0, 0, now)?;
    Ok(())
}

/// Moves a pending job to `RUNNING`. Returns false when it was not pending.
pub fn mark_running(conn: &Connection, id: &str, now: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'RUNNING', started_at = COALESCE(started_at, ?2),
             updated_at = ?2
         WHERE id = ?1 AND status = 'PENDING'",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Overwrites the `extra` payload of a job.
pub fn update_extra(
    conn: &Connection,
    id: &str,
    extra: &JobExtra,
    now: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET extra = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, extra, now],
    )?;
    Ok(())
}

/// Moves every unfinished job among `jobs` that has `done >= total` to its
/// terminal status: `FAILED` when any unit failed, else `SUCCESS`.
pub fn finalise_ready(
    conn: &Connection,
    jobs: &[Job],
    now: i64,
) -> Result<Vec<Transition>, DatabaseError> {
    let mut transitions = Vec::new();
    let mut stmt = conn.prepare(
        "UPDATE jobs SET
             status = CASE WHEN failed > 0 THEN 'FAILED' ELSE 'SUCCESS' END,
             is_done = 1, done = total,
             started_at = COALESCE(started_at, ?2), finished_at = ?2, updated_at = ?2
         WHERE id = ?1 AND is_done = 0 AND done >= total
         RETURNING status",
    )?;
    for job in jobs {
        let status = stmt
            .query_row(params![job.id, now], |r| r.get::<_, JobStatus>(0))
            .optional()?;
        if let Some(status) = status {
            transitions.push(transition_of(job, status));
        }
    }
    Ok(transitions)
}

/// Seals unfinished jobs in `jobs` with a terminal status and error.
/// Their `done` counter is forced to `total`; `failed_delta` is added to
/// their `failed` counter.
pub fn seal(
    conn: &Connection,
    jobs: &[Job],
    status: JobStatus,
    error: Option<&str>,
    failed_delta: i64,
    now: i64,
) -> Result<Vec<Transition>, DatabaseError> {
    let mut transitions = Vec::new();
    let mut stmt = conn.prepare(
        "UPDATE jobs SET
             status = ?2, is_done = 1, done = total, error = ?3,
             failed = MIN(total, failed + ?4),
             started_at = COALESCE(started_at, ?5), finished_at = ?5, updated_at = ?5
         WHERE id = ?1 AND is_done = 0",
    )?;
    for job in jobs {
        if stmt.execute(params![job.id, status, error, failed_delta, now])? > 0 {
            transitions.push(transition_of(job, status));
        }
    }
    Ok(transitions)
}

/// Unfinished jobs that wait on `id` through `depends_on`.
pub fn pending_dependents(conn: &Connection, id: &str) -> Result<Vec<Job>, DatabaseError> {
    select_jobs(
        conn,
        &format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE depends_on = ?1 AND is_done = 0
             ORDER BY created_at ASC, rowid ASC"
        ),
        id,
    )
}

/// Selects the next job a worker may run, skipping `in_flight` ids.
///
/// A job is runnable when it is unfinished, its dependency (if any)
/// succeeded, its parent (if any) is unfinished and its own local step is
/// still outstanding. Highest priority first, then oldest first.
pub fn pick_runnable(
    conn: &Connection,
    in_flight: &[String],
) -> Result<Option<Job>, DatabaseError> {
    let mut param_values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
    let mut in_flight_clause = String::new();
    if !in_flight.is_empty() {
        let placeholders: Vec<String> = (1..=in_flight.len()).map(|i| format!("?{}", i)).collect();
        in_flight_clause = format!("AND j.id NOT IN ({})", placeholders.join(", "));
        for id in in_flight {
            param_values.push(id);
        }
    }

    let sql = format!(
        "SELECT {cols} FROM jobs j
         LEFT JOIN jobs d ON d.id = j.depends_on
         LEFT JOIN jobs p ON p.id = j.parent_job_id
         WHERE j.is_done = 0
           AND (j.depends_on IS NULL OR d.status = 'SUCCESS')
           AND (j.parent_job_id IS NULL OR p.is_done = 0)
           AND j.done <= (SELECT COALESCE(SUM(c.done), 0) FROM jobs c WHERE c.parent_job_id = j.id)
           {in_flight_clause}
         ORDER BY j.priority DESC, j.created_at ASC, j.rowid ASC
         LIMIT 1",
        cols = prefixed_columns("j"),
    );

    let job = conn
        .query_row(&sql, param_values.as_slice(), job_from_row)
        .optional()?;
    Ok(job)
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<Job>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref user_id) = filter.user_id {
        conditions.push(format!("user_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(user_id.clone()));
    }
    if let Some(status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status));
    }
    if let Some(job_type) = filter.job_type {
        conditions.push(format!("job_type = ?{}", param_values.len() + 1));
        param_values.push(Box::new(job_type));
    }
    if let Some(is_done) = filter.is_done {
        conditions.push(format!("is_done = ?{}", param_values.len() + 1));
        param_values.push(Box::new(is_done));
    }
    match filter.parent_job_id {
        Some(ref parent) => {
            conditions.push(format!("parent_job_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(parent.clone()));
        }
        None => conditions.push("parent_job_id IS NULL".to_string()),
    }

    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    // Count total matching rows.
    let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    // Fetch paginated results.
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<Job> = stmt
        .query_map(params_ref.as_slice(), job_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Deletes a job row. Its subtree goes with it through the foreign key.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Cancelled jobs created before `cutoff` whose parent is not itself such
/// a job, so deleting them removes every stale chain exactly once.
pub fn stale_canceled_roots(conn: &Connection, cutoff: i64) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT j.id FROM jobs j
         LEFT JOIN jobs p ON p.id = j.parent_job_id
         WHERE j.status = 'CANCELED' AND j.created_at < ?1
           AND NOT (p.id IS NOT NULL AND p.status = 'CANCELED' AND p.created_at < ?1)
         ORDER BY j.created_at ASC",
    )?;
    let ids = stmt
        .query_map(params![cutoff], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
