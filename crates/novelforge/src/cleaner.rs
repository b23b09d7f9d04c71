//! Periodic cleanup: expires old cancelled jobs and keeps the novels
//! directory under the configured disk budget.

use std::time::Duration;

use thiserror::Error;

use crate::clock::now_millis;
use crate::error::StorageError;
use crate::jobs::{JobError, JobService};
use crate::library::{LibraryError, NovelLibrary};
use crate::signal::Signal;
use crate::storage::disk;

/// Cancelled jobs older than this are deleted.
pub const RETENTION: Duration = Duration::from_secs(5 * 24 * 60 * 60);

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_jobs: usize,
    pub evicted_novels: Vec<String>,
    /// Size of the novels directory after eviction, when a budget is set.
    pub disk_usage: Option<u64>,
}

#[derive(Clone)]
pub struct Cleaner {
    jobs: JobService,
    library: NovelLibrary,
    disk_size_limit: u64,
}

impl Cleaner {
    pub fn new(jobs: JobService, library: NovelLibrary, disk_size_limit: u64) -> Self {
        Self {
            jobs,
            library,
            disk_size_limit,
        }
    }

    /// Runs both phases. Stops early once `signal` is set.
    pub fn run(&self, signal: &Signal) -> Result<CleanupReport, CleanerError> {
        let mut report = CleanupReport {
            expired_jobs: self.expire_canceled_jobs(signal)?,
            ..Default::default()
        };

        if self.disk_size_limit > 0 && !signal.is_set() {
            let (evicted, usage) = self.enforce_disk_budget(signal)?;
            report.evicted_novels = evicted;
            report.disk_usage = Some(usage);
        }
        Ok(report)
    }

    fn expire_canceled_jobs(&self, signal: &Signal) -> Result<usize, CleanerError> {
        let cutoff = now_millis() - RETENTION.as_millis() as i64;
        let mut expired = 0;
        for id in self.jobs.stale_canceled(cutoff)? {
            if signal.is_set() {
                break;
            }
            self.jobs.purge(&id)?;
            expired += 1;
        }
        if expired > 0 {
            log::info!("Deleted {} expired cancelled jobs", expired);
        }
        Ok(expired)
    }

    /// Evicts novel directories, oldest mtime first, until the novels
    /// directory fits the budget. Returns the evicted ids and final size.
    fn enforce_disk_budget(&self, signal: &Signal) -> Result<(Vec<String>, u64), CleanerError> {
        let novels_dir = self.library.storage().novels_dir();
        let mut current = disk::dir_size(&novels_dir)?;
        let mut evicted = Vec::new();

        if current > self.disk_size_limit {
            for dir in disk::novel_dirs(&novels_dir)? {
                if current <= self.disk_size_limit || signal.is_set() {
                    break;
                }
                let size = disk::dir_size(&dir.path)?;
                log::info!("Evicting novel {} ({} bytes)", dir.novel_id, size);
                self.library.delete_novel(&dir.novel_id)?;
                current = current.saturating_sub(size);
                evicted.push(dir.novel_id);
            }
            log::info!(
                "Novels directory is now {} bytes (limit {})",
                current,
                self.disk_size_limit
            );
        }
        Ok((evicted, current))
    }
}
