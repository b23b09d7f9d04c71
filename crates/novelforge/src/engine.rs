//! The service graph. Every component receives its collaborators here;
//! nothing is looked up globally.

use std::sync::{Arc, Mutex};

use crate::artifact::ArtifactService;
use crate::capability::{Binder, Fetcher, Mailer};
use crate::cleaner::{Cleaner, CleanerError, CleanupReport};
use crate::config::{validate_config, EngineConfig};
use crate::db::Database;
use crate::error::{NovelforgeError, Result, StorageError};
use crate::jobs::{Job, JobError, JobExtra, JobService, JobType, Transition};
use crate::library::NovelLibrary;
use crate::runner::{JobRunner, Notifier};
use crate::scheduler::Scheduler;
use crate::signal::{CancelToken, Signal};
use crate::storage::FileStorage;
use crate::user::{User, UserService};

/// Implementations of the collaborators the engine calls out to.
#[derive(Clone)]
pub struct Capabilities {
    pub fetcher: Arc<dyn Fetcher>,
    pub binder: Arc<dyn Binder>,
    pub mailer: Arc<dyn Mailer>,
}

pub struct Engine {
    config: EngineConfig,
    db: Database,
    jobs: JobService,
    users: UserService,
    library: NovelLibrary,
    artifacts: ArtifactService,
    notifier: Notifier,
    runner: JobRunner,
    cleaner: Cleaner,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Engine {
    /// Creates the output directory, opens the database and wires the
    /// services. Workers are not started.
    pub fn open(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        validate_config(&config)?;
        std::fs::create_dir_all(&config.output_directory).map_err(|e| {
            StorageError::CreateDirectory {
                path: config.output_directory.clone(),
                source: e,
            }
        })?;
        let db = Database::open(&config.database_path())?;
        Ok(Self::with_database(config, db, capabilities))
    }

    pub fn with_database(config: EngineConfig, db: Database, capabilities: Capabilities) -> Self {
        let Capabilities {
            fetcher,
            binder,
            mailer,
        } = capabilities;

        let storage = FileStorage::new(&config.output_directory);
        let jobs = JobService::new(db.clone(), Arc::clone(&fetcher));
        let users = UserService::new(db.clone());
        let library = NovelLibrary::new(db.clone(), storage.clone());
        let artifacts = ArtifactService::new(db.clone(), storage);
        let notifier = Notifier::new(jobs.clone(), users.clone(), mailer);
        let runner = JobRunner::new(
            jobs.clone(),
            users.clone(),
            library.clone(),
            artifacts.clone(),
            fetcher,
            binder,
            notifier.clone(),
        );
        let cleaner = Cleaner::new(jobs.clone(), library.clone(), config.disk_size_limit);

        Self {
            config,
            db,
            jobs,
            users,
            library,
            artifacts,
            notifier,
            runner,
            cleaner,
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn jobs(&self) -> &JobService {
        &self.jobs
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn library(&self) -> &NovelLibrary {
        &self.library
    }

    pub fn artifacts(&self) -> &ArtifactService {
        &self.artifacts
    }

    /// Starts the scheduler. Does nothing when it already runs.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.scheduler_slot();
        if slot.is_some() {
            return Ok(());
        }
        let scheduler = Scheduler::start(
            self.config.scheduler(),
            self.jobs.clone(),
            self.runner.clone(),
            self.cleaner.clone(),
        )
        .map_err(NovelforgeError::Spawn)?;
        *slot = Some(scheduler);
        Ok(())
    }

    /// Stops the scheduler and waits for its workers.
    pub fn stop(&self) {
        let scheduler = self.scheduler_slot().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler_slot().is_some()
    }

    /// Ids the workers currently own. Empty when the scheduler is stopped.
    pub fn in_flight(&self) -> Vec<String> {
        self.scheduler_slot()
            .as_ref()
            .map(Scheduler::in_flight)
            .unwrap_or_default()
    }

    fn scheduler_slot(&self) -> std::sync::MutexGuard<'_, Option<Scheduler>> {
        match self.scheduler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Picks and runs one step on the calling thread. Returns the id of the
    /// job that ran. Meant for callers that drive the engine without
    /// starting workers.
    pub fn run_next(&self) -> Result<Option<String>> {
        let Some(job) = self.jobs.pick_runnable(&[])? else {
            return Ok(None);
        };
        self.runner.process(&job, &CancelToken::never());
        Ok(Some(job.id))
    }

    /// Calls [`Engine::run_next`] until nothing is runnable or `max_steps`
    /// steps ran. Returns the number of steps.
    pub fn run_until_idle(&self, max_steps: usize) -> Result<usize> {
        let mut steps = 0;
        while steps < max_steps && self.run_next()?.is_some() {
            steps += 1;
        }
        Ok(steps)
    }

    pub fn run_cleaner(&self) -> std::result::Result<CleanupReport, CleanerError> {
        self.cleaner.run(&Signal::new())
    }

    /// Creates a root job for `user`.
    pub fn submit(
        &self,
        user: &User,
        job_type: JobType,
        extra: JobExtra,
    ) -> std::result::Result<Job, JobError> {
        self.jobs.create(user, job_type, extra, None, None)
    }

    /// Cancels a job subtree, wakes runners still working on it and mails
    /// reports for ancestors the cancel completed.
    pub fn cancel(
        &self,
        user: &User,
        id: &str,
        reason: Option<&str>,
    ) -> std::result::Result<Vec<Transition>, JobError> {
        let transitions = match self.scheduler_slot().as_ref() {
            Some(scheduler) => scheduler.cancel(user, id, reason)?,
            None => self.jobs.cancel(user, id, reason)?,
        };
        self.notifier.transitions(&transitions);
        Ok(transitions)
    }

    pub fn delete(&self, user: &User, id: &str) -> std::result::Result<Vec<Transition>, JobError> {
        let transitions = self.jobs.delete(user, id)?;
        self.notifier.transitions(&transitions);
        Ok(transitions)
    }

    pub fn replay(&self, user: &User, id: &str) -> std::result::Result<Job, JobError> {
        self.jobs.replay(user, id)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
