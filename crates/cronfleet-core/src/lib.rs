//! Shared model for the cronfleet scheduler fleet.
//!
//! Holds the pieces every other crate agrees on:
//!
//! - [`Role`], [`LeaseRecord`], [`JobDescriptor`] and [`LedgerEntry`]
//! - [`JobRegistry`], the validated table of periodic jobs
//! - [`FleetLedger`], the bounded `{instance → status}` map
//! - [`FleetConfig`], parsed from `cronfleet.toml`
//! - [`Clock`], the only source of time for the protocol

pub mod clock;
pub mod config;
pub mod duration;
pub mod ledger;
pub mod registry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FleetConfig, LeaseTimings, StoreBackend};
pub use duration::parse_duration;
pub use ledger::FleetLedger;
pub use registry::{JobRegistry, JobSpec, RegistryError, LISTENER_JOB_ID};
pub use types::*;
