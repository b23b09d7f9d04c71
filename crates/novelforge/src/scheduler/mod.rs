//! Worker threads that pick runnable jobs and the periodic cleaner.
//!
//! Every worker loops: sleep for the runner cooldown, take the pick-lock,
//! choose either the cleaner (when due) or the best runnable job not
//! already in flight, mark it in flight, release the lock, and run it.
//! The in-flight entry is always removed afterwards, even if the step
//! panicked.

mod pick_lock;

pub use pick_lock::{InFlight, PickLock, CLEANER_SLOT};

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::cleaner::Cleaner;
use crate::jobs::{Job, JobError, JobService, Transition};
use crate::runner::JobRunner;
use crate::signal::{CancelToken, Signal};
use crate::user::User;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub concurrency: usize,
    /// Pause before every pick.
    pub runner_cooldown: Duration,
    /// Minimum time between two cleaner runs.
    pub cleaner_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            runner_cooldown: Duration::from_secs(1),
            cleaner_cooldown: Duration::from_secs(6 * 60 * 60),
        }
    }
}

enum Task {
    Run(Job, Signal),
    Clean,
}

struct Shared {
    config: SchedulerConfig,
    jobs: JobService,
    runner: JobRunner,
    cleaner: Cleaner,
    lock: PickLock,
    shutdown: Signal,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawns `config.concurrency` workers (at least one).
    pub fn start(
        config: SchedulerConfig,
        jobs: JobService,
        runner: JobRunner,
        cleaner: Cleaner,
    ) -> std::io::Result<Self> {
        let worker_count = config.concurrency.max(1);
        let shared = Arc::new(Shared {
            config,
            jobs,
            runner,
            cleaner,
            lock: PickLock::new(),
            shutdown: Signal::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("novelforge-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, &worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.shutdown.set();
                    join_all(workers);
                    return Err(e);
                }
            }
        }

        info!("Started {} workers", worker_count);
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Cancels a job subtree and wakes the runners working on any part of it.
    pub fn cancel(
        &self,
        user: &User,
        id: &str,
        reason: Option<&str>,
    ) -> Result<Vec<Transition>, JobError> {
        let transitions = self.shared.jobs.cancel(user, id, reason)?;
        self.wake(&transitions);
        Ok(transitions)
    }

    /// Wakes the runners of every job that just finished, so they stop at
    /// their next cancellation check.
    pub fn wake(&self, transitions: &[Transition]) {
        wake_sealed(&self.shared.lock.acquire_always(), transitions);
    }

    /// Ids currently owned by a worker, including the cleaner slot.
    pub fn in_flight(&self) -> Vec<String> {
        self.shared.lock.acquire_always().ids()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_set()
    }

    /// Signals shutdown and joins every worker. Safe to call twice.
    pub fn stop(&self) {
        if !self.shared.shutdown.is_set() {
            info!("Shutting down scheduler...");
        }
        self.shared.shutdown.set();

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if !workers.is_empty() {
            join_all(workers);
            info!("All workers have stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for (i, worker) in workers.into_iter().enumerate() {
        if let Err(e) = worker.join() {
            error!("Worker {} panicked: {:?}", i, e);
        } else {
            debug!("Worker {} finished", i);
        }
    }
}

fn wake_sealed(in_flight: &InFlight, transitions: &[Transition]) {
    for transition in transitions {
        if in_flight.signal(&transition.job_id) {
            debug!("Signalled in-flight job {}", transition.job_id);
        }
    }
}

fn run_worker(worker_id: usize, shared: &Shared) {
    debug!("Worker {} started", worker_id);

    loop {
        if shared.shutdown.wait(shared.config.runner_cooldown) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        let Some(task) = pick(shared) else {
            continue;
        };

        match task {
            Task::Clean => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    shared.cleaner.run(&shared.shutdown)
                }));
                match outcome {
                    Ok(Ok(report)) => debug!("Worker {} finished cleanup: {:?}", worker_id, report),
                    Ok(Err(e)) => error!("Cleanup failed: {}", e),
                    Err(_) => error!("Cleaner panicked on worker {}", worker_id),
                }
                shared.lock.acquire_always().release_cleaner();
            }
            Task::Run(job, signal) => {
                debug!("Worker {} processing job {}", worker_id, job.id);
                let token = CancelToken::new(signal, shared.shutdown.clone());
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    shared.runner.process(&job, &token)
                }));
                let mut in_flight = shared.lock.acquire_always();
                in_flight.remove(&job.id);
                match outcome {
                    Ok(sealed) => wake_sealed(&in_flight, &sealed),
                    Err(_) => error!("Job {} panicked on worker {}", job.id, worker_id),
                }
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Chooses the next task under the pick-lock and marks it in flight.
fn pick(shared: &Shared) -> Option<Task> {
    let mut in_flight = shared.lock.acquire(&shared.shutdown)?;

    if in_flight.cleaner_due(shared.config.cleaner_cooldown) {
        in_flight.claim_cleaner();
        return Some(Task::Clean);
    }

    match shared.jobs.pick_runnable(&in_flight.ids()) {
        Ok(Some(job)) => {
            let signal = in_flight.insert(&job.id);
            Some(Task::Run(job, signal))
        }
        Ok(None) => None,
        Err(e) => {
            error!("Failed to pick a runnable job: {}", e);
            None
        }
    }
}
