//! Test harness for isolated engine runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary output directory and on-disk database
//! - An `Engine` wired to fake capabilities that share its library
//! - Helpers to create users and inspect the job tree

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use novelforge::jobs::JobFilter;
use novelforge::{
    Capabilities, Database, Engine, EngineConfig, FileStorage, Job, JobStatus, JobType, NotifyItem,
    NovelLibrary, User, UserRole, UserTier,
};

use super::fakes::{FakeBinder, FakeFetcher, FakeSite, RecordingMailer};

pub struct TestHarness {
    temp_dir: TempDir,
    pub output_dir: PathBuf,
    pub engine: Engine,
    pub fetcher: Arc<FakeFetcher>,
    pub binder: Arc<FakeBinder>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(FakeSite::default(), FakeBinder::default(), |_| {})
    }

    pub fn with_site(site: FakeSite) -> Self {
        Self::build(site, FakeBinder::default(), |_| {})
    }

    pub fn build<F>(site: FakeSite, binder: FakeBinder, configure: F) -> Self
    where
        F: FnOnce(&mut EngineConfig),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let mut config = EngineConfig {
            output_directory: output_dir.clone(),
            runner_concurrency: 2,
            runner_cooldown: 0,
            ..Default::default()
        };
        configure(&mut config);

        let db = Database::open(&config.database_path()).expect("Failed to open database");
        let library = NovelLibrary::new(db.clone(), FileStorage::new(&output_dir));

        let fetcher = Arc::new(FakeFetcher::new(library, site));
        let binder = Arc::new(binder);
        let mailer = Arc::new(RecordingMailer::default());
        let engine = Engine::with_database(
            config,
            db,
            Capabilities {
                fetcher: fetcher.clone(),
                binder: binder.clone(),
                mailer: mailer.clone(),
            },
        );

        Self {
            temp_dir,
            output_dir,
            engine,
            fetcher,
            binder,
            mailer,
        }
    }

    /// Creates and stores a user subscribed to every notification.
    pub fn user(&self, tier: UserTier) -> User {
        self.user_with_role(tier, UserRole::User)
    }

    pub fn user_with_role(&self, tier: UserTier, role: UserRole) -> User {
        let n = uuid_suffix();
        let mut user = User::new(
            &format!("reader-{}", n),
            &format!("reader-{}@example.com", n),
            role,
            tier,
        );
        user.notify.extend([
            NotifyItem::JobRunning,
            NotifyItem::JobSuccess,
            NotifyItem::JobFailure,
            NotifyItem::ArtifactReady,
        ]);
        self.engine.users().create(&user).expect("Failed to store user");
        user
    }

    pub fn job(&self, id: &str) -> Job {
        self.engine.jobs().get(id).expect("Job not found")
    }

    /// Every job in the subtree of `id`, excluding `id` itself.
    pub fn subtree(&self, id: &str) -> Vec<Job> {
        let mut out = Vec::new();
        let mut queue = vec![id.to_string()];
        while let Some(next) = queue.pop() {
            for child in self.engine.jobs().children(&next).expect("children") {
                queue.push(child.id.clone());
                out.push(child);
            }
        }
        out
    }

    pub fn subtree_of_type(&self, id: &str, job_type: JobType) -> Vec<Job> {
        self.subtree(id)
            .into_iter()
            .filter(|j| j.job_type == job_type)
            .collect()
    }

    pub fn roots(&self) -> Vec<Job> {
        self.engine
            .jobs()
            .list(&JobFilter::default())
            .expect("list")
            .0
    }

    /// Runs steps on this thread until nothing is runnable.
    pub fn run_until_idle(&self) -> usize {
        self.engine.run_until_idle(10_000).expect("run_until_idle")
    }

    /// Runs single steps until `predicate` holds. Panics if the engine
    /// goes idle first.
    pub fn run_until<F>(&self, predicate: F)
    where
        F: Fn(&Self) -> bool,
    {
        while !predicate(self) {
            let ran = self.engine.run_next().expect("run_next");
            assert!(ran.is_some(), "engine went idle before the condition held");
        }
    }

    /// Polls until the job is done, for tests that run the scheduler.
    pub fn wait_done(&self, id: &str, timeout: Duration) -> Job {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.job(id);
            if job.is_done {
                return job;
            }
            assert!(Instant::now() < deadline, "job {} still {:?}", id, job.status);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Asserts the roll-up invariant on every job of the subtree.
    pub fn assert_consistent(&self, id: &str) {
        let root = self.job(id);
        for job in std::iter::once(root).chain(self.subtree(id)) {
            let children = self.engine.jobs().children(&job.id).expect("children");
            let child_total: i64 = children.iter().map(|c| c.total).sum();
            assert_eq!(job.total, 1 + child_total, "total of {}", job.id);
            assert!(job.done <= job.total, "done of {}", job.id);
            assert_eq!(job.is_done, job.done == job.total, "is_done of {}", job.id);
            if job.is_done {
                assert!(job.status.is_terminal(), "status of {}", job.id);
                assert!(job.finished_at.is_some());
            } else {
                assert!(matches!(job.status, JobStatus::Pending | JobStatus::Running));
            }
        }
    }
}

fn uuid_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
