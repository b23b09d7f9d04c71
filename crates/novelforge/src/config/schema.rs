use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Defaults to `<output_directory>/novelforge.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_runner_concurrency")]
    pub runner_concurrency: usize,
    /// Seconds a worker sleeps before each pick.
    #[serde(default = "default_runner_cooldown")]
    pub runner_cooldown: u64,
    /// Seconds between cleaner runs.
    #[serde(default = "default_cleaner_cooldown")]
    pub cleaner_cooldown: u64,
    /// Size budget of the novels directory in bytes. 0 disables eviction.
    #[serde(default)]
    pub disk_size_limit: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            output_directory: default_output_directory(),
            database_path: None,
            runner_concurrency: default_runner_concurrency(),
            runner_cooldown: default_runner_cooldown(),
            cleaner_cooldown: default_cleaner_cooldown(),
            disk_size_limit: 0,
        }
    }
}

impl EngineConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.output_directory.join("novelforge.db"))
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.runner_concurrency.max(1),
            runner_cooldown: Duration::from_secs(self.runner_cooldown),
            cleaner_cooldown: Duration::from_secs(self.cleaner_cooldown),
        }
    }
}

/// `~/.novelforge/output`, falling back to a relative directory when the
/// home directory is unknown.
pub fn default_output_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".novelforge").join("output"))
        .unwrap_or_else(|| PathBuf::from(".novelforge").join("output"))
}

fn default_runner_concurrency() -> usize {
    num_cpus::get()
}

fn default_runner_cooldown() -> u64 {
    1
}

fn default_cleaner_cooldown() -> u64 {
    6 * 60 * 60
}
