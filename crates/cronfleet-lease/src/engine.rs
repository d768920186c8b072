//! Lease Protocol Engine.
//!
//! One call to [`LeaseEngine::tick`] per polling interval:
//!
//! 1. Lease held by this instance: renew it (remaining runner).
//! 2. Lease held by another instance: stand by, demoting if the runner
//!    table is still installed here.
//! 3. Lease absent, init marker present: another instance is mid-claim.
//! 4. Both absent: set the marker, install the runner table, write the
//!    lease, clear the marker (becoming runner).
//!
//! The installed table's digest tells "becoming" apart from "remaining":
//! a table is only reinstalled when the desired text differs from what
//! the installer reports.
//!
//! Every failure is absorbed into the returned [`TickReport`]. Store
//! reads that fail count as "absent"; store writes that fail abort the
//! transition and keep the current role.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use cronfleet_core::{
    Clock, FleetLedger, JobRegistry, LeaseRecord, LeaseTimings, LedgerEntry, Role,
};
use cronfleet_schedule::{
    InstalledTable, Installer, RenderedTable, ScheduleLayout, materialize, render,
};
use cronfleet_store::{LeaseStore, LeaseStoreClient, StoreError};

use crate::report::{TickFault, TickReport, Transition};

/// The election/renewal/failover state machine.
///
/// Holds no state between ticks; everything it knows comes from the
/// store and the installer.
pub struct LeaseEngine {
    store: LeaseStoreClient<Arc<dyn LeaseStore>>,
    installer: Arc<dyn Installer>,
    clock: Arc<dyn Clock>,
    registry: JobRegistry,
    layout: ScheduleLayout,
    timings: LeaseTimings,
}

/// Working state of a single tick.
struct Tick<'a> {
    address: &'a str,
    now: u64,
    installed: Option<InstalledTable>,
    faults: Vec<TickFault>,
}

impl Tick<'_> {
    /// Role implied by the installed table; no cronfleet table means
    /// standby.
    fn current_role(&self) -> Role {
        self.installed
            .as_ref()
            .and_then(|table| table.role)
            .unwrap_or(Role::Listener)
    }
}

impl LeaseEngine {
    pub fn new(
        store: LeaseStoreClient<Arc<dyn LeaseStore>>,
        installer: Arc<dyn Installer>,
        clock: Arc<dyn Clock>,
        registry: JobRegistry,
        layout: ScheduleLayout,
        timings: LeaseTimings,
    ) -> Self {
        Self {
            store,
            installer,
            clock,
            registry,
            layout,
            timings,
        }
    }

    pub fn store(&self) -> &LeaseStoreClient<Arc<dyn LeaseStore>> {
        &self.store
    }

    pub fn layout(&self) -> &ScheduleLayout {
        &self.layout
    }

    pub fn timings(&self) -> &LeaseTimings {
        &self.timings
    }

    /// The table `role` would install on this instance.
    pub fn table_for(&self, role: Role) -> RenderedTable {
        render(&materialize(role, &self.registry, &self.layout), &self.layout)
    }

    /// Run one protocol tick for `address`.
    pub fn tick(&self, address: &str) -> TickReport {
        let mut tick = self.begin(address);
        let (role, transition) = self.elect(&mut tick);
        self.finish(tick, role, transition)
    }

    /// Role after one tick.
    pub fn evaluate(&self, address: &str) -> Role {
        self.tick(address).role
    }

    /// Opt this instance out of the fleet.
    ///
    /// Installs the placeholder table and records DEACTIVATED in the
    /// ledger. The lease is neither written nor cleared: a lease this
    /// instance held simply expires.
    pub fn decommission(&self, address: &str) -> TickReport {
        let mut tick = self.begin(address);
        let (role, transition) = if self.ensure_table(&mut tick, Role::Deactivated) {
            info!(%address, "instance deactivated");
            (Role::Deactivated, Transition::Deactivated)
        } else {
            (tick.current_role(), Transition::Aborted)
        };
        self.finish(tick, role, transition)
    }

    // ── Tick phases ────────────────────────────────────────────────

    fn begin<'a>(&self, address: &'a str) -> Tick<'a> {
        let mut faults = Vec::new();
        let installed = match self.installer.installed() {
            Ok(table) => table,
            Err(e) => {
                error!(installer = self.installer.name(), error = %e, "failed to read installed table");
                faults.push(TickFault::installer("inspect", e));
                None
            }
        };
        Tick {
            address,
            now: self.clock.now_secs(),
            installed,
            faults,
        }
    }

    fn elect(&self, tick: &mut Tick<'_>) -> (Role, Transition) {
        let lease = match self.store.read_lease() {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "lease read failed; treating lease as absent");
                tick.faults.push(TickFault::store("read lease", e));
                None
            }
        };

        match lease {
            Some(lease) if lease.is_held_by(tick.address) => self.renew(tick, &lease),
            Some(lease) => self.stand_by(tick, &lease.holder),
            None => self.claim(tick),
        }
    }

    fn renew(&self, tick: &mut Tick<'_>, lease: &LeaseRecord) -> (Role, Transition) {
        // Reinstalls only after a registry or layout change, or when the
        // table was lost (reboot, manual edit).
        if !self.ensure_table(tick, Role::Runner) {
            let current = tick.current_role();
            if current != Role::Runner {
                // Holding the lease without running the jobs would block
                // failover; let it lapse instead.
                warn!(
                    address = %tick.address,
                    %current,
                    "runner table not installed; lease left to expire"
                );
                return (current, Transition::Aborted);
            }
            warn!(address = %tick.address, "runner table not refreshed; keeping the installed one");
        }

        match self
            .store
            .write_lease(&lease.renewed(tick.now), self.timings.lease_ttl())
        {
            Ok(()) => debug!(address = %tick.address, "lease renewed"),
            Err(e) => {
                warn!(address = %tick.address, error = %e, "lease renewal failed");
                tick.faults.push(TickFault::store("renew lease", e));
            }
        }
        (Role::Runner, Transition::Renewed)
    }

    fn stand_by(&self, tick: &mut Tick<'_>, holder: &str) -> (Role, Transition) {
        let was_runner = tick.current_role() == Role::Runner;
        if !self.ensure_table(tick, Role::Listener) {
            return (tick.current_role(), Transition::Aborted);
        }
        if was_runner {
            info!(address = %tick.address, %holder, "lease held by another instance; demoted to LISTENER");
            (Role::Listener, Transition::Demoted)
        } else {
            debug!(address = %tick.address, %holder, "standing by");
            (Role::Listener, Transition::Standby)
        }
    }

    fn claim(&self, tick: &mut Tick<'_>) -> (Role, Transition) {
        let marker = match self.store.marker_present() {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "init marker read failed; treating marker as absent");
                tick.faults.push(TickFault::store("read init marker", e));
                false
            }
        };
        if marker {
            debug!(address = %tick.address, "another instance is claiming the lease");
            return self.settle(tick, Role::Listener, Transition::Contended);
        }

        if let Err(e) = self.store.set_marker(tick.address, self.timings.init_marker_ttl) {
            warn!(address = %tick.address, error = %e, "init marker write failed; claim aborted");
            tick.faults.push(TickFault::store("set init marker", e));
            let current = tick.current_role();
            return self.settle(tick, current, Transition::Aborted);
        }

        if !self.ensure_table(tick, Role::Runner) {
            self.clear_marker(tick);
            return (Role::Listener, Transition::Aborted);
        }

        let lease = LeaseRecord::new(tick.address, tick.now);
        if let Err(e) = self.store.write_lease(&lease, self.timings.lease_ttl()) {
            warn!(address = %tick.address, error = %e, "lease write failed; rolling back to LISTENER");
            tick.faults.push(TickFault::store("write lease", e));
            self.ensure_table(tick, Role::Listener);
            self.clear_marker(tick);
            return (tick.current_role(), Transition::Aborted);
        }

        if let Err(e) = self
            .store
            .write_last_active(tick.address, self.timings.last_active_ttl)
        {
            warn!(error = %e, "last-active write failed");
            tick.faults.push(TickFault::store("write last-active", e));
        }
        self.clear_marker(tick);

        info!(address = %tick.address, "lease claimed; now RUNNER");
        (Role::Runner, Transition::Claimed)
    }

    fn finish(&self, tick: Tick<'_>, role: Role, transition: Transition) -> TickReport {
        let Tick {
            address,
            now,
            installed,
            mut faults,
        } = tick;
        let schedule = installed.map(|table| table.entries()).unwrap_or_default();

        self.record_status(address, role, &schedule, now, &mut faults);

        if !faults.is_empty() {
            warn!(%address, %role, %transition, faults = faults.len(), "tick finished with faults");
        }
        TickReport {
            address: address.to_string(),
            role,
            transition,
            faults,
            schedule,
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Install the table for `role` unless it is already installed.
    /// Returns false (and records a fault) when the installer fails.
    fn ensure_table(&self, tick: &mut Tick<'_>, role: Role) -> bool {
        let table = self.table_for(role);
        if tick
            .installed
            .as_ref()
            .is_some_and(|installed| installed.digest == table.digest)
        {
            return true;
        }
        match self.installer.install(&table) {
            Ok(()) => {
                debug!(%role, digest = %table.digest, "table installed");
                tick.installed = Some(InstalledTable::from_text(&table.text));
                true
            }
            Err(e) => {
                error!(%role, installer = self.installer.name(), error = %e, "table install failed");
                tick.faults.push(TickFault::installer("install", e));
                false
            }
        }
    }

    /// Make `role` the installed role, falling back to whatever is
    /// installed when that fails.
    fn settle(&self, tick: &mut Tick<'_>, role: Role, transition: Transition) -> (Role, Transition) {
        if self.ensure_table(tick, role) {
            (role, transition)
        } else {
            (tick.current_role(), Transition::Aborted)
        }
    }

    fn clear_marker(&self, tick: &mut Tick<'_>) {
        if let Err(e) = self.store.clear_marker() {
            warn!(error = %e, "init marker clear failed; it will expire");
            tick.faults.push(TickFault::store("clear init marker", e));
        }
    }

    fn record_status(
        &self,
        address: &str,
        role: Role,
        schedule: &[String],
        now: u64,
        faults: &mut Vec<TickFault>,
    ) {
        let ledger = match self.store.load_ledger() {
            Ok(ledger) => ledger,
            Err(StoreError::Deserialize(reason)) => {
                warn!(%reason, "fleet ledger unreadable; starting a new one");
                FleetLedger::new()
            }
            Err(e) => {
                warn!(error = %e, "fleet ledger read failed");
                faults.push(TickFault::store("read ledger", e));
                return;
            }
        };
        let mut ledger = ledger.with_staleness(self.timings.ledger_staleness);
        ledger.record(LedgerEntry {
            address: address.to_string(),
            role,
            schedule: schedule.to_vec(),
            observed_at: now,
        });

        if role == Role::Runner {
            let window = self.timings.lease_ttl().as_secs();
            let others: Vec<&str> = ledger
                .list()
                .filter(|e| e.role == Role::Runner && e.address != address)
                .filter(|e| now.saturating_sub(e.observed_at) <= window)
                .map(|e| e.address.as_str())
                .collect();
            if !others.is_empty() {
                warn!(%address, ?others, "other instances recently reported RUNNER");
            }
        }

        if let Err(e) = self.store.save_ledger(&ledger, self.timings.ledger_ttl) {
            warn!(error = %e, "fleet ledger write failed");
            faults.push(TickFault::store("write ledger", e));
        }
    }
}
