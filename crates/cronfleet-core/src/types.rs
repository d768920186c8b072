//! Shared types used across cronfleet crates.
//!
//! These types describe the lease, the materialized job table, and the
//! per-instance status entries. All of them are serializable to/from JSON
//! for storage in the shared key-value store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a fleet instance (usually its private address).
pub type InstanceAddress = String;

// ── Role ──────────────────────────────────────────────────────────

/// Role an instance currently plays in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Standby: only the polling job is installed.
    Listener,
    /// Active scheduler: the full job registry is installed.
    Runner,
    /// Opted out of the fleet, e.g. during maintenance.
    Deactivated,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Listener => "LISTENER",
            Role::Runner => "RUNNER",
            Role::Deactivated => "DEACTIVATED",
        }
    }

    pub const ALL: [Role; 3] = [Role::Listener, Role::Runner, Role::Deactivated];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listener" => Ok(Role::Listener),
            "runner" => Ok(Role::Runner),
            "deactivated" => Ok(Role::Deactivated),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ── Environment ───────────────────────────────────────────────────

/// Deployment environment. Selects the log sub-directory and the
/// environment label in the rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    #[default]
    Live,
}

impl Environment {
    /// Directory name under the log root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Live => "live",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Live => "LIVE",
        }
    }
}

// ── Lease ─────────────────────────────────────────────────────────

/// The single shared value naming the active scheduler.
///
/// Stored with a TTL of `poll_interval + safety_margin`; an instance that
/// stops renewing lets the record vanish on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub holder: InstanceAddress,
    /// Unix timestamp (seconds) when the holder claimed the role.
    pub acquired_at: u64,
    /// Unix timestamp (seconds) of the latest renewal.
    pub renewed_at: u64,
}

impl LeaseRecord {
    pub fn new(holder: &str, now: u64) -> Self {
        Self {
            holder: holder.to_string(),
            acquired_at: now,
            renewed_at: now,
        }
    }

    /// Same holder and acquisition time, fresh renewal stamp.
    pub fn renewed(&self, now: u64) -> Self {
        Self {
            holder: self.holder.clone(),
            acquired_at: self.acquired_at,
            renewed_at: now,
        }
    }

    pub fn is_held_by(&self, address: &str) -> bool {
        self.holder == address
    }
}

// ── Job table ─────────────────────────────────────────────────────

/// One executable row of a materialized schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Recurrence expression (`*/5 * * * *`, `@hourly`, ...).
    pub schedule: String,
    /// Job identifier from the registry (or `listener`).
    pub job: String,
    /// Full command line, including output redirection.
    pub command: String,
}

impl JobDescriptor {
    pub fn to_line(&self) -> String {
        format!("{} {}", self.schedule, self.command)
    }
}

/// A row of the installed table: either a job or a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleEntry {
    Job(JobDescriptor),
    Comment { text: String },
}

impl ScheduleEntry {
    pub fn comment(text: impl Into<String>) -> Self {
        ScheduleEntry::Comment { text: text.into() }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, ScheduleEntry::Job(_))
    }

    pub fn to_line(&self) -> String {
        match self {
            ScheduleEntry::Job(job) => job.to_line(),
            ScheduleEntry::Comment { text } => format!("# {text}"),
        }
    }
}

// ── Fleet status ──────────────────────────────────────────────────

/// Last-known status of one instance, written only by that instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub address: InstanceAddress,
    pub role: Role,
    /// Lines of the table the instance has installed.
    pub schedule: Vec<String>,
    /// Unix timestamp (seconds) of the write.
    pub observed_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("runner".parse::<Role>().unwrap(), Role::Runner);
        assert_eq!("LISTENER".parse::<Role>().unwrap(), Role::Listener);
        assert_eq!(" Deactivated ".parse::<Role>().unwrap(), Role::Deactivated);
        assert!("leader".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_as_upper_case_label() {
        let json = serde_json::to_string(&Role::Runner).unwrap();
        assert_eq!(json, "\"RUNNER\"");
        for role in Role::ALL {
            assert_eq!(role.to_string(), role.label());
        }
    }

    #[test]
    fn renewal_keeps_holder_and_acquisition() {
        let lease = LeaseRecord::new("10.0.0.1", 1_000);
        let renewed = lease.renewed(1_060);
        assert_eq!(renewed.holder, "10.0.0.1");
        assert_eq!(renewed.acquired_at, 1_000);
        assert_eq!(renewed.renewed_at, 1_060);
        assert!(renewed.is_held_by("10.0.0.1"));
        assert!(!renewed.is_held_by("10.0.0.2"));
    }

    #[test]
    fn entry_lines() {
        let job = ScheduleEntry::Job(JobDescriptor {
            schedule: "0 * * * *".to_string(),
            job: "hourly".to_string(),
            command: "/srv/run hourly".to_string(),
        });
        assert!(job.is_executable());
        assert_eq!(job.to_line(), "0 * * * * /srv/run hourly");

        let comment = ScheduleEntry::comment("paused");
        assert!(!comment.is_executable());
        assert_eq!(comment.to_line(), "# paused");
    }

    #[test]
    fn environment_names() {
        assert_eq!(Environment::default(), Environment::Live);
        assert_eq!(Environment::Dev.dir_name(), "dev");
        assert_eq!(Environment::Live.label(), "LIVE");
    }
}
