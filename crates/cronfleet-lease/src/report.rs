//! Tick outcomes.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use cronfleet_core::{InstanceAddress, Role};

/// How a tick changed (or kept) the instance's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Won an empty lease and became the runner.
    Claimed,
    /// Already the holder; lease expiry refreshed.
    Renewed,
    /// Another instance holds the lease.
    Standby,
    /// Lease absent but another instance is mid-claim.
    Contended,
    /// Lease names another instance while the runner table was installed.
    Demoted,
    /// Decommissioned.
    Deactivated,
    /// A claim or demotion could not complete; retried next tick.
    Aborted,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Claimed => "claimed",
            Transition::Renewed => "renewed",
            Transition::Standby => "standby",
            Transition::Contended => "contended",
            Transition::Demoted => "demoted",
            Transition::Deactivated => "deactivated",
            Transition::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A failure absorbed by a tick. Never propagated past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickFault {
    #[error("store unavailable during {op}: {reason}")]
    StoreUnavailable { op: &'static str, reason: String },

    #[error("installer failed during {op}: {reason}")]
    InstallerFailed { op: &'static str, reason: String },
}

impl TickFault {
    pub fn store(op: &'static str, err: impl fmt::Display) -> Self {
        TickFault::StoreUnavailable {
            op,
            reason: err.to_string(),
        }
    }

    pub fn installer(op: &'static str, err: impl fmt::Display) -> Self {
        TickFault::InstallerFailed {
            op,
            reason: err.to_string(),
        }
    }
}

/// Result of one protocol run on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub address: InstanceAddress,
    pub role: Role,
    pub transition: Transition,
    pub faults: Vec<TickFault>,
    /// Rows of the table installed at the end of the tick.
    pub schedule: Vec<String>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}
