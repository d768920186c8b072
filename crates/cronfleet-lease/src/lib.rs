//! The lease protocol engine and its orchestrator.
//!
//! Each instance runs discrete, non-overlapping ticks. A tick reads the
//! shared lease, decides this instance's role, installs the matching
//! table, and records the outcome in the fleet ledger:
//!
//! ```text
//! Orchestrator (log dirs, lifecycle edges)
//!   └── LeaseEngine::tick(address) -> TickReport
//!         ├── LeaseStoreClient  lease-holder / init-marker / fleet-status
//!         ├── materialize + render
//!         └── dyn Installer
//! ```
//!
//! The store has no compare-and-swap. Two instances may both claim in
//! the same tick; the next tick leaves exactly one address in the store
//! and the other instance demotes itself.

pub mod engine;
pub mod orchestrator;
pub mod report;

pub use engine::LeaseEngine;
pub use orchestrator::Orchestrator;
pub use report::{TickFault, TickReport, Transition};
