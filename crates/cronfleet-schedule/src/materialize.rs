//! Schedule Materializer: role + registry -> ordered job rows.

use serde::{Deserialize, Serialize};

use cronfleet_core::{JobDescriptor, JobRegistry, LISTENER_JOB_ID, Role, ScheduleEntry};

use crate::layout::ScheduleLayout;

/// Comment installed in place of any job on a deactivated instance.
pub const DEACTIVATED_PLACEHOLDER: &str = "!!! Cron is deactivated !!!";

/// Standby table body when ticks come from a long-running process.
pub const WATCH_STANDBY_NOTE: &str = "standby: ticks driven by cronfleet watch";

/// Standby polling cadence.
const LISTENER_SCHEDULE: &str = "* * * * *";

/// The rows one role installs, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub role: Role,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    /// Rows that actually fire a process.
    pub fn executable(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.entries.iter().filter_map(|entry| match entry {
            ScheduleEntry::Job(job) => Some(job),
            ScheduleEntry::Comment { .. } => None,
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ScheduleEntry::to_line).collect()
    }
}

/// Build the table for `role`.
///
/// - RUNNER: one row per registry job, in registry order.
/// - LISTENER: the polling invocation, every minute, or a note when
///   polling is off.
/// - DEACTIVATED: a single placeholder comment.
pub fn materialize(role: Role, registry: &JobRegistry, layout: &ScheduleLayout) -> Schedule {
    let entries = match role {
        Role::Runner => registry
            .iter()
            .map(|spec| {
                ScheduleEntry::Job(JobDescriptor {
                    schedule: spec.schedule.clone(),
                    job: spec.id.clone(),
                    command: format!(
                        "{} {} >> {}",
                        layout.invoker,
                        spec.id,
                        layout.log_path(&spec.id).display()
                    ),
                })
            })
            .collect(),
        Role::Listener if !layout.cron_polling => {
            vec![ScheduleEntry::comment(WATCH_STANDBY_NOTE)]
        }
        Role::Listener => vec![ScheduleEntry::Job(JobDescriptor {
            schedule: LISTENER_SCHEDULE.to_string(),
            job: LISTENER_JOB_ID.to_string(),
            command: format!(
                "{} >> {}",
                layout.listener_command,
                layout.log_path(LISTENER_JOB_ID).display()
            ),
        })],
        Role::Deactivated => vec![ScheduleEntry::comment(DEACTIVATED_PLACEHOLDER)],
    };
    Schedule { role, entries }
}
