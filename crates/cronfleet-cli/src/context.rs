//! Wiring from configuration to a ready engine.

use std::net::{IpAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use tracing::{debug, info, warn};

use cronfleet_core::{
    Clock, Environment, FleetConfig, JobRegistry, LeaseTimings, StoreBackend, SystemClock,
};
use cronfleet_lease::{LeaseEngine, Orchestrator};
use cronfleet_schedule::{CrontabInstaller, Installer, MemoryInstaller, ScheduleLayout};
use cronfleet_store::{
    KeySpace, LeaseStore, LeaseStoreClient, MemoryStore, RedbStore, RedisConfig, RedisStore,
};

use crate::GlobalOpts;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cronfleet/cronfleet.toml";

pub type StoreClient = LeaseStoreClient<Arc<dyn LeaseStore>>;

/// Everything a command needs, resolved from flags and the config file.
pub struct CliContext {
    pub config: FleetConfig,
    address: Option<String>,
    pub dry_run: bool,
    pub clock: Arc<dyn Clock>,
    cron_polling: bool,
}

/// An orchestrator plus, for dry runs, the installer that captured the
/// table instead of installing it.
pub struct Setup {
    pub orchestrator: Orchestrator,
    pub preview: Option<Arc<MemoryInstaller>>,
}

impl CliContext {
    pub fn load(opts: &GlobalOpts) -> anyhow::Result<Self> {
        let config = load_config(opts.config.as_deref())?;
        let address = opts.address.clone().or_else(|| config.instance.address.clone());
        Ok(Self {
            config,
            address,
            dry_run: opts.dry_run,
            clock: Arc::new(SystemClock),
            cron_polling: true,
        })
    }

    /// Ticks come from this process, so standbys install no polling row.
    pub fn polled_in_process(mut self) -> Self {
        self.cron_polling = false;
        self
    }

    /// Configured address, or the detected private address.
    pub fn address(&self) -> anyhow::Result<String> {
        match &self.address {
            Some(address) => Ok(address.clone()),
            None => detect_address().context("set --address or [instance].address"),
        }
    }

    pub fn environment(&self, address: &str) -> Environment {
        self.config.environment_for(address)
    }

    pub fn layout(&self, environment: Environment) -> ScheduleLayout {
        let layout = ScheduleLayout::from_config(&self.config.schedule, environment);
        if self.cron_polling {
            layout
        } else {
            layout.without_cron_polling()
        }
    }

    pub fn registry(&self) -> anyhow::Result<JobRegistry> {
        self.config.registry().context("invalid [[jobs]] table")
    }

    pub fn timings(&self) -> anyhow::Result<LeaseTimings> {
        self.config.lease.timings().context("invalid [lease] section")
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::with_prefix(self.config.store.key_prefix.as_deref())
    }

    /// Open the configured shared store.
    pub fn store(&self) -> anyhow::Result<Arc<dyn LeaseStore>> {
        let cfg = &self.config.store;
        let store: Arc<dyn LeaseStore> = match cfg.backend {
            StoreBackend::Redis => {
                let redis = RedisConfig::new(&cfg.address)
                    .with_timeouts(cfg.connect_timeout()?, cfg.io_timeout()?)
                    .with_auth(cfg.password.clone(), cfg.database);
                Arc::new(RedisStore::new(redis))
            }
            StoreBackend::Redb => {
                ensure_parent(&cfg.path)?;
                Arc::new(
                    RedbStore::open(&cfg.path, self.clock.clone())
                        .with_context(|| format!("opening {}", cfg.path.display()))?,
                )
            }
            StoreBackend::Memory => {
                warn!("memory store backend: the lease is not shared with other processes");
                Arc::new(MemoryStore::new(self.clock.clone()))
            }
        };
        debug!(backend = store.backend_name(), "lease store ready");
        Ok(store)
    }

    pub fn store_client(&self) -> anyhow::Result<StoreClient> {
        Ok(LeaseStoreClient::new(self.store()?).with_keys(self.keys()))
    }

    /// Build the orchestrator for `address`.
    ///
    /// In dry-run mode the engine talks to a memory store seeded from the
    /// shared store and to a memory installer seeded with the installed
    /// table, so nothing outside this process changes.
    pub fn setup(&self, address: &str) -> anyhow::Result<Setup> {
        let registry = self.registry()?;
        let timings = self.timings()?;
        let layout = self.layout(self.environment(address));
        let crontab = CrontabInstaller::new(&self.config.schedule.crontab_program);

        if !self.dry_run {
            let engine = LeaseEngine::new(
                self.store_client()?,
                Arc::new(crontab),
                self.clock.clone(),
                registry,
                layout,
                timings,
            );
            return Ok(Setup {
                orchestrator: Orchestrator::new(engine),
                preview: None,
            });
        }

        let snapshot = self.snapshot(&timings)?;
        let installed = crontab.installed().unwrap_or_else(|e| {
            warn!(error = %e, "could not read the installed table; assuming none");
            None
        });
        let preview = Arc::new(MemoryInstaller::preloaded(installed));
        let installer: Arc<dyn Installer> = preview.clone();
        let engine = LeaseEngine::new(
            snapshot,
            installer,
            self.clock.clone(),
            registry,
            layout,
            timings,
        );
        Ok(Setup {
            orchestrator: Orchestrator::new(engine).without_provisioning(),
            preview: Some(preview),
        })
    }

    /// Copy the coordination keys into a private memory store.
    fn snapshot(&self, timings: &LeaseTimings) -> anyhow::Result<StoreClient> {
        let shared = self.store_client()?;
        let memory: Arc<dyn LeaseStore> = Arc::new(MemoryStore::new(self.clock.clone()));
        let local = LeaseStoreClient::new(memory).with_keys(self.keys());

        if let Some(lease) = shared.read_lease()? {
            local.write_lease(&lease, timings.lease_ttl())?;
        }
        if shared.marker_present()? {
            local.set_marker("snapshot", timings.init_marker_ttl)?;
        }
        local.save_ledger(&shared.load_ledger()?, timings.ledger_ttl)?;
        info!("dry run: using a snapshot of the shared store");
        Ok(local)
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FleetConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    if !explicit && !path.exists() {
        info!(path = %path.display(), "no configuration file; using defaults");
        return Ok(FleetConfig::default());
    }
    let config = FleetConfig::from_file(&path)?;
    debug!(path = %path.display(), jobs = config.jobs.len(), "configuration loaded");
    Ok(config)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Private address of the default route's interface. A UDP connect sends
/// no packets.
fn detect_address() -> anyhow::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("10.255.255.255:1")?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() || ip.is_loopback() {
        bail!("could not detect a private address (got {ip})");
    }
    if let IpAddr::V4(v4) = ip {
        if !v4.is_private() {
            warn!(%ip, "detected address is not private");
        }
    }
    Ok(ip.to_string())
}
