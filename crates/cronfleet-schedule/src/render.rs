//! Crontab text rendering.
//!
//! ```text
//! ### <title> - CronTab ###
//! # cronfleet::RUNNER
//! # Dynamic crontab (LIVE)
//! MAILTO="ops@example.com"
//!
//! */5 * * * * /srv/run stats5 >> /var/log/cronfleet/live/stats5.log
//! ```
//!
//! The second line marks which role's table is installed. No timestamps
//! are rendered, so identical inputs give identical text and digests.

use sha2::{Digest, Sha256};

use cronfleet_core::Role;

use crate::layout::ScheduleLayout;
use crate::materialize::Schedule;

const MARKER_PREFIX: &str = "# cronfleet::";

/// Installable table text with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub role: Role,
    pub text: String,
    /// Hex SHA-256 of the normalized text.
    pub digest: String,
}

impl RenderedTable {
    pub fn lines(&self) -> Vec<String> {
        self.text.lines().map(str::to_string).collect()
    }
}

pub fn role_marker(role: Role) -> String {
    format!("{MARKER_PREFIX}{}", role.label())
}

/// Role named by the first marker line in `text`, if any.
pub fn marked_role(text: &str) -> Option<Role> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix(MARKER_PREFIX))
        .and_then(|label| label.trim().parse().ok())
}

pub fn render(schedule: &Schedule, layout: &ScheduleLayout) -> RenderedTable {
    let mut text = String::new();
    text.push_str(&format!("### {} - CronTab ###\n", layout.title));
    text.push_str(&role_marker(schedule.role));
    text.push('\n');
    text.push_str(&format!(
        "# Dynamic crontab ({})\n",
        layout.environment.label()
    ));
    if let Some(mailto) = &layout.mailto {
        text.push_str(&format!("MAILTO=\"{mailto}\"\n"));
    }
    text.push('\n');
    for line in schedule.lines() {
        text.push_str(&line);
        text.push('\n');
    }

    RenderedTable {
        role: schedule.role,
        digest: digest(&text),
        text,
    }
}

/// Digest of a table, ignoring trailing whitespace and trailing blank
/// lines so text read back from the installer compares equal.
pub fn digest(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let end = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |i| i + 1);
    let mut hasher = Sha256::new();
    for line in &lines[..end] {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
