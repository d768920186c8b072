//! Where jobs log and how the table header reads.

use std::path::{Path, PathBuf};

use cronfleet_core::Environment;
use cronfleet_core::config::ScheduleConfig;
use tracing::debug;

use crate::error::{ScheduleError, ScheduleResult};

/// Instance-specific inputs to materializing and rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleLayout {
    pub title: String,
    pub mailto: Option<String>,
    /// Program that runs a job given its id.
    pub invoker: String,
    /// Polling invocation installed on standbys.
    pub listener_command: String,
    /// Whether standbys are polled from the installed table. Off when a
    /// long-running process drives the ticks itself.
    pub cron_polling: bool,
    pub log_dir: PathBuf,
    pub environment: Environment,
}

impl ScheduleLayout {
    pub fn from_config(config: &ScheduleConfig, environment: Environment) -> Self {
        Self {
            title: config.title.clone(),
            mailto: config.mailto.clone(),
            invoker: config.invoker.clone(),
            listener_command: config.listener_command.clone(),
            cron_polling: true,
            log_dir: config.log_dir.clone(),
            environment,
        }
    }

    /// Leave the polling row out of the LISTENER table.
    pub fn without_cron_polling(mut self) -> Self {
        self.cron_polling = false;
        self
    }

    /// `<log_dir>/<env>/<name>.log`
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir
            .join(self.environment.dir_name())
            .join(format!("{name}.log"))
    }

    /// Create the `dev` and `live` log directories under `log_dir`.
    pub fn ensure_dirs(&self) -> ScheduleResult<()> {
        for env in [Environment::Dev, Environment::Live] {
            let dir = self.log_dir.join(env.dir_name());
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> ScheduleResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| ScheduleError::Provision {
        path: dir.to_path_buf(),
        source,
    })?;
    debug!(path = %dir.display(), "log directory created");
    Ok(())
}
