//! Multi-instance simulations: several engines sharing one store and one
//! clock, each with its own installer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cronfleet_core::{
    Environment, JobRegistry, JobSpec, LeaseTimings, ManualClock, Role,
};
use cronfleet_lease::{LeaseEngine, Transition};
use cronfleet_schedule::{Installer, MemoryInstaller, ScheduleLayout};
use cronfleet_store::{KeySpace, LeaseStore, LeaseStoreClient, MemoryStore, StoreResult};

const POLL: Duration = Duration::from_secs(60);

/// Hides the lease and the init marker from reads while switched on, so
/// an instance sees an empty store even though another has claimed.
struct BlindStore {
    inner: Arc<MemoryStore>,
    keys: KeySpace,
    blind: AtomicBool,
}

impl LeaseStore for BlindStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let hidden = key == self.keys.lease_holder || key == self.keys.init_marker;
        if hidden && self.blind.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(key)
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.inner.set_with_ttl(key, value, ttl)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key)
    }

    fn backend_name(&self) -> &'static str {
        "blind"
    }
}

struct Instance {
    address: String,
    installer: Arc<MemoryInstaller>,
    engine: LeaseEngine,
}

impl Instance {
    fn tick(&self) -> cronfleet_lease::TickReport {
        self.engine.tick(&self.address)
    }

    fn installed_role(&self) -> Option<Role> {
        self.installer.role()
    }
}

struct Fleet {
    clock: ManualClock,
    store: Arc<MemoryStore>,
    instances: Vec<Instance>,
}

impl Fleet {
    fn new(size: usize) -> Self {
        let clock = ManualClock::at_secs(1_700_000_000);
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let mut fleet = Fleet {
            clock,
            store,
            instances: Vec::new(),
        };
        for i in 0..size {
            let store: Arc<dyn LeaseStore> = fleet.store.clone();
            fleet.add(&format!("10.0.0.{}", i + 1), store);
        }
        fleet
    }

    fn add(&mut self, address: &str, store: Arc<dyn LeaseStore>) {
        let installer = Arc::new(MemoryInstaller::new());
        let engine = LeaseEngine::new(
            LeaseStoreClient::new(store),
            installer.clone(),
            Arc::new(self.clock.clone()),
            registry(),
            layout(),
            LeaseTimings::default(),
        );
        self.instances.push(Instance {
            address: address.to_string(),
            installer,
            engine,
        });
    }

    fn get(&self, address: &str) -> &Instance {
        self.instances
            .iter()
            .find(|i| i.address == address)
            .unwrap()
    }

    fn runners(&self) -> Vec<&str> {
        self.instances
            .iter()
            .filter(|i| i.installed_role() == Some(Role::Runner))
            .map(|i| i.address.as_str())
            .collect()
    }

    fn holder(&self) -> Option<String> {
        LeaseStoreClient::new(self.store.clone())
            .read_lease()
            .unwrap()
            .map(|lease| lease.holder)
    }
}

fn registry() -> JobRegistry {
    JobRegistry::new(vec![
        JobSpec::new("stats5", "*/5 * * * *"),
        JobSpec::new("midnight", "0 0 * * *"),
        JobSpec::new("weekly", "0 3 * * sun"),
    ])
    .unwrap()
}

fn layout() -> ScheduleLayout {
    ScheduleLayout {
        title: "Fleet".to_string(),
        mailto: None,
        invoker: "/srv/app/cron/run cron".to_string(),
        listener_command: "/usr/local/bin/cronfleet activate".to_string(),
        cron_polling: true,
        log_dir: PathBuf::from("/var/log/cronfleet"),
        environment: Environment::Live,
    }
}

#[test]
fn at_most_one_runner_across_rotating_tick_orders() {
    let fleet = Fleet::new(5);
    let n = fleet.instances.len();

    for round in 0..20 {
        // Rotate who ticks first so every instance gets the first look.
        for k in 0..n {
            fleet.instances[(round + k) % n].tick();
        }
        assert_eq!(fleet.runners().len(), 1, "round {round}: {:?}", fleet.runners());
        fleet.clock.advance(POLL);
    }

    let ledger = LeaseStoreClient::new(fleet.store.clone()).load_ledger().unwrap();
    assert_eq!(ledger.len(), 5);
    assert_eq!(ledger.runners().len(), 1);
}

#[test]
fn standby_takes_over_after_the_runner_stops_renewing() {
    let fleet = Fleet::new(3);
    for instance in &fleet.instances {
        instance.tick();
    }
    assert_eq!(fleet.runners(), ["10.0.0.1"]);

    // 10.0.0.1 crashes: it stops ticking. Lease TTL is 90s.
    let mut elapsed = Duration::ZERO;
    let ttl = LeaseTimings::default().lease_ttl();
    let new_runner = loop {
        fleet.clock.advance(POLL);
        elapsed += POLL;
        for instance in &fleet.instances[1..] {
            instance.tick();
        }
        let runners: Vec<&str> = fleet
            .runners()
            .into_iter()
            .filter(|a| *a != "10.0.0.1")
            .collect();
        if let [runner] = runners.as_slice() {
            break runner.to_string();
        }
        assert!(elapsed <= ttl + POLL, "no failover after {elapsed:?}");
    };

    assert_eq!(fleet.holder().as_deref(), Some(new_runner.as_str()));
}

#[test]
fn claim_standby_and_failover_between_two_instances() {
    let fleet = Fleet::new(2);
    let a = fleet.get("10.0.0.1");
    let b = fleet.get("10.0.0.2");

    let report = a.tick();
    assert_eq!(report.transition, Transition::Claimed);
    assert_eq!(fleet.holder().as_deref(), Some("10.0.0.1"));

    let report = b.tick();
    assert_eq!(report.role, Role::Listener);
    assert_eq!(report.transition, Transition::Standby);

    // A stops renewing for longer than the lease TTL.
    fleet
        .clock
        .advance(LeaseTimings::default().lease_ttl() + Duration::from_secs(1));
    let report = b.tick();
    assert_eq!(report.role, Role::Runner);
    assert_eq!(report.transition, Transition::Claimed);
    assert_eq!(fleet.holder().as_deref(), Some("10.0.0.2"));
}

#[test]
fn double_activation_resolves_on_the_next_tick() {
    let mut fleet = Fleet::new(1);
    let blind = Arc::new(BlindStore {
        inner: fleet.store.clone(),
        keys: KeySpace::default(),
        blind: AtomicBool::new(true),
    });
    fleet.add("10.0.0.2", blind.clone());

    // Both observe an empty store in the same tick.
    assert_eq!(fleet.get("10.0.0.1").tick().transition, Transition::Claimed);
    assert_eq!(fleet.get("10.0.0.2").tick().transition, Transition::Claimed);
    assert_eq!(fleet.runners().len(), 2);
    blind.blind.store(false, Ordering::SeqCst);

    // Last writer wins; the other demotes itself.
    fleet.clock.advance(POLL);
    let winner = fleet.holder().unwrap();
    assert_eq!(winner, "10.0.0.2");
    let loser = fleet.get("10.0.0.1").tick();
    assert_eq!(loser.role, Role::Listener);
    assert_eq!(loser.transition, Transition::Demoted);
    assert_eq!(fleet.get("10.0.0.2").tick().transition, Transition::Renewed);

    assert_eq!(fleet.runners(), ["10.0.0.2"]);
}

#[test]
fn decommissioning_the_runner_leaves_the_rest_of_the_fleet_alone() {
    let fleet = Fleet::new(3);
    for instance in &fleet.instances {
        instance.tick();
    }
    let runner = fleet.get("10.0.0.1");
    assert_eq!(runner.installed_role(), Some(Role::Runner));

    let report = runner.engine.decommission(&runner.address);
    assert_eq!(report.role, Role::Deactivated);
    let installed = runner.installer.installed().unwrap().unwrap();
    assert!(installed.job_lines().is_empty());

    // Lease untouched; standbys unaffected.
    assert_eq!(fleet.holder().as_deref(), Some("10.0.0.1"));
    for address in ["10.0.0.2", "10.0.0.3"] {
        assert_eq!(fleet.get(address).installed_role(), Some(Role::Listener));
        assert_eq!(fleet.get(address).tick().transition, Transition::Standby);
    }

    // The lease expires on its own and a standby takes over.
    fleet.clock.advance(LeaseTimings::default().lease_ttl());
    assert_eq!(fleet.get("10.0.0.2").tick().transition, Transition::Claimed);
    assert_eq!(fleet.get("10.0.0.3").tick().transition, Transition::Standby);
    assert_eq!(fleet.runners(), ["10.0.0.2"]);
    assert_eq!(
        fleet.get("10.0.0.1").installed_role(),
        Some(Role::Deactivated)
    );
}

#[test]
fn fleet_survives_a_store_outage() {
    let fleet = Fleet::new(3);
    for instance in &fleet.instances {
        instance.tick();
    }
    assert_eq!(fleet.runners(), ["10.0.0.1"]);

    fleet.store.set_unavailable(true);
    for _ in 0..3 {
        fleet.clock.advance(POLL);
        for instance in &fleet.instances {
            let report = instance.tick();
            assert!(!report.is_clean());
        }
        // Roles are retained; nobody claims blind.
        assert_eq!(fleet.runners(), ["10.0.0.1"]);
    }

    // The lease expired during the outage. Whoever ticks first after
    // recovery may claim; by the end of the round there is one runner.
    fleet.store.set_unavailable(false);
    for round in 0..3 {
        fleet.clock.advance(POLL);
        for k in 0..3 {
            fleet.instances[(k + 1) % 3].tick();
        }
        assert_eq!(fleet.runners().len(), 1, "round {round}");
    }
}

#[test]
fn departed_instances_are_pruned_from_the_ledger() {
    let fleet = Fleet::new(3);
    for instance in &fleet.instances {
        instance.tick();
    }

    // 10.0.0.3 disappears; the others keep ticking past the window.
    for _ in 0..6 {
        fleet.clock.advance(POLL);
        for instance in &fleet.instances[..2] {
            instance.tick();
        }
    }

    let ledger = LeaseStoreClient::new(fleet.store.clone()).load_ledger().unwrap();
    let addresses: Vec<&str> = ledger.list().map(|e| e.address.as_str()).collect();
    assert_eq!(addresses, ["10.0.0.1", "10.0.0.2"]);
}

#[test]
fn materialized_tables_are_deterministic_across_instances() {
    let fleet = Fleet::new(2);
    for role in Role::ALL {
        let a = fleet.instances[0].engine.table_for(role);
        let b = fleet.instances[1].engine.table_for(role);
        assert_eq!(a.text, b.text);
        assert_eq!(a.digest, b.digest);
    }
}
