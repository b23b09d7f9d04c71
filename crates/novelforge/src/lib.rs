pub mod artifact;
pub mod capability;
pub mod cleaner;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod library;
pub mod logging;
pub mod runner;
pub mod scheduler;
pub mod signal;
pub mod storage;
pub mod user;

pub use artifact::{Artifact, ArtifactService, OutputFormat};
pub use capability::{
    ArtifactRequest, BindError, Binder, BoundFile, FetchError, Fetcher, MailError, Mailer,
    NoopMailer,
};
pub use cleaner::{Cleaner, CleanupReport};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use db::{Database, DatabaseError};
pub use engine::{Capabilities, Engine};
pub use error::{ConfigError, NovelforgeError, Result, StorageError};
pub use jobs::{Job, JobError, JobExtra, JobPriority, JobService, JobStatus, JobType, Transition};
pub use library::{Chapter, ChapterImage, Novel, NovelLibrary, Volume};
pub use runner::JobRunner;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use signal::{Aborted, CancelToken, Signal};
pub use storage::FileStorage;
pub use user::{NotifyItem, User, UserRole, UserService, UserTier};
