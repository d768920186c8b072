//! Bootstrap/teardown orchestrator.
//!
//! Wraps the engine for the two lifecycle edges: `activate` (boot and
//! every polling tick) and `deactivate` (decommission). Both first make
//! sure the per-environment log directories exist.

use tracing::{error, info};

use crate::engine::LeaseEngine;
use crate::report::{TickFault, TickReport};

pub struct Orchestrator {
    engine: LeaseEngine,
    provision: bool,
}

impl Orchestrator {
    pub fn new(engine: LeaseEngine) -> Self {
        Self {
            engine,
            provision: true,
        }
    }

    /// Leave the log directories alone (dry runs).
    pub fn without_provisioning(mut self) -> Self {
        self.provision = false;
        self
    }

    pub fn engine(&self) -> &LeaseEngine {
        &self.engine
    }

    /// Run one claim-or-renew tick.
    pub fn activate(&self, address: &str) -> TickReport {
        let provisioned = self.provision();
        let report = self.engine.tick(address);
        info!(
            %address,
            role = %report.role,
            transition = %report.transition,
            "activate finished"
        );
        with_fault(report, provisioned)
    }

    /// Decommission this instance.
    pub fn deactivate(&self, address: &str) -> TickReport {
        let provisioned = self.provision();
        let report = self.engine.decommission(address);
        with_fault(report, provisioned)
    }

    fn provision(&self) -> Option<TickFault> {
        if !self.provision {
            return None;
        }
        match self.engine.layout().ensure_dirs() {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "log directory provisioning failed");
                Some(TickFault::installer("provision log dirs", e))
            }
        }
    }
}

fn with_fault(mut report: TickReport, fault: Option<TickFault>) -> TickReport {
    if let Some(fault) = fault {
        report.faults.insert(0, fault);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cronfleet_core::{
        Environment, JobRegistry, JobSpec, LeaseTimings, ManualClock, Role,
    };
    use cronfleet_schedule::{MemoryInstaller, ScheduleLayout};
    use cronfleet_store::{LeaseStore, LeaseStoreClient, MemoryStore};

    use crate::report::Transition;

    fn orchestrator(log_dir: std::path::PathBuf) -> Orchestrator {
        let clock = ManualClock::at_secs(1_000_000);
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let layout = ScheduleLayout {
            title: "Fleet".to_string(),
            mailto: None,
            invoker: "/srv/run".to_string(),
            listener_command: "/usr/local/bin/cronfleet activate".to_string(),
            cron_polling: true,
            log_dir,
            environment: Environment::Dev,
        };
        let engine = LeaseEngine::new(
            LeaseStoreClient::new(store),
            Arc::new(MemoryInstaller::new()),
            Arc::new(clock),
            JobRegistry::new(vec![JobSpec::new("hourly", "@hourly")]).unwrap(),
            layout,
            LeaseTimings::default(),
        );
        Orchestrator::new(engine)
    }

    #[test]
    fn activate_provisions_log_dirs() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(root.path().join("logs"));

        let report = orchestrator.activate("10.0.0.1");
        assert!(report.is_clean());
        assert_eq!(report.role, Role::Runner);
        assert!(root.path().join("logs/dev").is_dir());
        assert!(root.path().join("logs/live").is_dir());
    }

    #[test]
    fn provisioning_failure_is_recorded_but_the_tick_runs() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("logs");
        std::fs::write(&blocker, b"file").unwrap();
        let orchestrator = orchestrator(blocker);

        let report = orchestrator.activate("10.0.0.1");
        assert_eq!(report.role, Role::Runner);
        assert!(matches!(
            report.faults.first(),
            Some(TickFault::InstallerFailed { op: "provision log dirs", .. })
        ));

        let report = orchestrator.deactivate("10.0.0.1");
        assert_eq!(report.transition, Transition::Deactivated);
        assert_eq!(report.faults.len(), 1);
    }
}
