//! What each role installs, and how it gets there.
//!
//! ```text
//! materialize(role, JobRegistry, ScheduleLayout) -> Schedule
//!   └── render(&Schedule) -> RenderedTable (text + sha256 digest)
//!         └── dyn Installer
//!               ├── CrontabInstaller  crontab(1) via a staging file
//!               └── MemoryInstaller   in-process, fault switch
//! ```
//!
//! Materializing and rendering are pure: the same role, registry and
//! layout always yield byte-identical text.

pub mod error;
pub mod installer;
pub mod layout;
pub mod materialize;
pub mod render;

pub use error::{ScheduleError, ScheduleResult};
pub use installer::{CrontabInstaller, InstalledTable, Installer, MemoryInstaller};
pub use layout::ScheduleLayout;
pub use materialize::{DEACTIVATED_PLACEHOLDER, Schedule, WATCH_STANDBY_NOTE, materialize};
pub use render::{RenderedTable, digest, marked_role, render, role_marker};
