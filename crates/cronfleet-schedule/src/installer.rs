//! Periodic-task installers.
//!
//! An installer atomically replaces the instance's table and reports
//! what is currently installed. Installing the same table twice has no
//! observable effect.

use std::ffi::OsStr;
use std::io::Write;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cronfleet_core::Role;

use crate::error::{ScheduleError, ScheduleResult};
use crate::render::{RenderedTable, digest, marked_role};

/// What an installer reports as currently installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledTable {
    /// Role marker found in the table; `None` for a table cronfleet did
    /// not write.
    pub role: Option<Role>,
    pub digest: String,
    pub lines: Vec<String>,
}

impl InstalledTable {
    pub fn from_text(text: &str) -> Self {
        Self {
            role: marked_role(text),
            digest: digest(text),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Non-comment, non-blank, non-variable lines.
    pub fn job_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !is_assignment(line))
            .map(str::to_string)
            .collect()
    }

    /// Rows below the header of a cronfleet table (placeholder comments
    /// included); plain job lines for any other table.
    pub fn entries(&self) -> Vec<String> {
        if self.role.is_none() {
            return self.job_lines();
        }
        self.lines
            .iter()
            .map(|line| line.trim())
            .skip_while(|line| !line.is_empty())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn is_assignment(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
}

/// Local periodic-task facility.
pub trait Installer: Send + Sync {
    /// Replace the installed table.
    fn install(&self, table: &RenderedTable) -> ScheduleResult<()>;

    /// Currently installed table, `None` when nothing is installed.
    fn installed(&self) -> ScheduleResult<Option<InstalledTable>>;

    fn name(&self) -> &'static str;
}

impl<I: Installer + ?Sized> Installer for Arc<I> {
    fn install(&self, table: &RenderedTable) -> ScheduleResult<()> {
        (**self).install(table)
    }

    fn installed(&self) -> ScheduleResult<Option<InstalledTable>> {
        (**self).installed()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<I: Installer + ?Sized> Installer for Box<I> {
    fn install(&self, table: &RenderedTable) -> ScheduleResult<()> {
        (**self).install(table)
    }

    fn installed(&self) -> ScheduleResult<Option<InstalledTable>> {
        (**self).installed()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ── crontab(1) ────────────────────────────────────────────────────

/// Installs through `crontab <file>` and lists with `crontab -l`.
#[derive(Debug, Clone)]
pub struct CrontabInstaller {
    program: String,
    args: Vec<String>,
}

impl Default for CrontabInstaller {
    fn default() -> Self {
        Self::new("crontab")
    }
}

impl CrontabInstaller {
    /// `command` is the program optionally followed by leading arguments,
    /// split on whitespace (`"crontab"`, `"sudo -n crontab"`).
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "crontab".to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }

    fn run(&self, extra: &[&OsStr]) -> ScheduleResult<Output> {
        Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .output()
            .map_err(|source| ScheduleError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

impl Installer for CrontabInstaller {
    fn install(&self, table: &RenderedTable) -> ScheduleResult<()> {
        let mut staging = tempfile::Builder::new()
            .prefix("cronfleet-")
            .suffix(".cron")
            .tempfile()?;
        staging.write_all(table.text.as_bytes())?;
        staging.flush()?;

        let output = self.run(&[staging.path().as_os_str()])?;
        if !output.status.success() {
            return Err(ScheduleError::Install {
                program: self.program.clone(),
                reason: failure_reason(&output),
            });
        }
        info!(role = %table.role, digest = %table.digest, "crontab installed");
        Ok(())
    }

    fn installed(&self) -> ScheduleResult<Option<InstalledTable>> {
        let output = self.run(&[OsStr::new("-l")])?;
        if !output.status.success() {
            let reason = failure_reason(&output);
            if reason.to_ascii_lowercase().contains("no crontab") {
                debug!("no crontab installed");
                return Ok(None);
            }
            return Err(ScheduleError::Inspect(reason));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Some(InstalledTable::from_text(&text)))
    }

    fn name(&self) -> &'static str {
        "crontab"
    }
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}

// ── In-memory ─────────────────────────────────────────────────────

/// Keeps the installed table in memory. Used by tests and `--dry-run`.
#[derive(Debug, Default)]
pub struct MemoryInstaller {
    installed: Mutex<Option<InstalledTable>>,
    failing: AtomicBool,
    installs: AtomicUsize,
}

impl MemoryInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already installed table (not counted as an install).
    pub fn preloaded(table: Option<InstalledTable>) -> Self {
        Self {
            installed: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Make every `install` fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful installs.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    /// Role of the installed table, if any.
    pub fn role(&self) -> Option<Role> {
        self.installed().ok().flatten().and_then(|table| table.role)
    }

    fn lock(&self) -> ScheduleResult<std::sync::MutexGuard<'_, Option<InstalledTable>>> {
        self.installed
            .lock()
            .map_err(|_| ScheduleError::Inspect("memory installer lock poisoned".to_string()))
    }
}

impl Installer for MemoryInstaller {
    fn install(&self, table: &RenderedTable) -> ScheduleResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScheduleError::Install {
                program: "memory".to_string(),
                reason: "installer switched off".to_string(),
            });
        }
        *self.lock()? = Some(InstalledTable::from_text(&table.text));
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn installed(&self) -> ScheduleResult<Option<InstalledTable>> {
        Ok(self.lock()?.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
