//! Discovery & classification engine.
//!
//! One cycle walks `Idle -> Sweeping -> Correlating -> Classifying -> Published`:
//!
//! 1. Resolve the vantage point and seed the table with the local host.
//! 2. Sweep its subnet, append every other neighbour with its vendor, and sort
//!    by vendor (absent first, stable). The merged table is persisted here.
//! 3. Browse advertised services and classify each host from the records
//!    carrying its address.
//! 4. Swap the new table in and publish a `hosts` event.
//!
//! A vantage point or sweep failure aborts the cycle, leaves the current table in
//! place and republishes it. A browse failure only costs classification: the
//! table is still published with every host `Unknown`.
//!
//! Only one cycle runs at a time. [`DiscoveryEngine::run_cycle`] waits for an
//! in-flight cycle to finish, [`DiscoveryEngine::try_run_cycle`] rejects instead.

use crate::classify::{classify, RuleSet};
use crate::network::{select_vantage_point, VantagePoint};
use crate::persistence;
use crate::publish::{Event, Hub, HOSTS_EVENT};
use crate::scanner::{DiscoveryError, DiscoverySource, Host, VendorDirectory};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Where the engine is in its discovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Sweeping,
    Correlating,
    Classifying,
    Published,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Sweeping => write!(f, "sweeping"),
            EngineState::Correlating => write!(f, "correlating"),
            EngineState::Classifying => write!(f, "classifying"),
            EngineState::Published => write!(f, "published"),
        }
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub vantage: VantagePoint,
    pub hosts: usize,
    pub services: usize,
    /// Hosts that ended up with a category other than `Unknown`
    pub classified: usize,
    /// Service browse failed, every host is `Unknown`
    pub classification_degraded: bool,
    /// Vendor data could not be loaded, every vendor is absent
    pub vendors_degraded: bool,
    pub subscribers: usize,
    pub elapsed: Duration,
}

/// Owner of the authoritative host table.
pub struct DiscoveryEngine {
    source: Arc<dyn DiscoverySource>,
    rules: RuleSet,
    hub: Arc<Hub>,
    store: Option<PathBuf>,
    hosts: RwLock<Arc<Vec<Host>>>,
    state: Mutex<EngineState>,
    cycle: tokio::sync::Mutex<()>,
    vendors: OnceCell<Arc<VendorDirectory>>,
}

impl DiscoveryEngine {
    pub fn new(source: Arc<dyn DiscoverySource>, rules: RuleSet, hub: Arc<Hub>) -> Self {
        Self {
            source,
            rules,
            hub,
            store: None,
            hosts: RwLock::new(Arc::new(Vec::new())),
            state: Mutex::new(EngineState::Idle),
            cycle: tokio::sync::Mutex::new(()),
            vendors: OnceCell::new(),
        }
    }

    /// Persist the merged table to `path` on every cycle.
    pub fn with_store(mut self, path: PathBuf) -> Self {
        self.store = Some(path);
        self
    }

    /// Load the persisted table, if any, as the current table.
    ///
    /// Nothing is published; subscribers pick it up when they connect.
    pub fn restore(&self) -> anyhow::Result<usize> {
        let Some(path) = &self.store else {
            return Ok(0);
        };
        let hosts = persistence::load_hosts(path)?;
        let count = hosts.len();
        if count > 0 {
            self.replace_table(hosts);
            tracing::info!("Restored {} hosts from {:?}", count, path);
        }
        Ok(count)
    }

    /// The current table. Never observes a cycle half-way.
    pub fn snapshot(&self) -> Arc<Vec<Host>> {
        self.hosts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `hosts` event carrying the current table.
    pub fn hosts_event(&self) -> Option<Event> {
        let snapshot = self.snapshot();
        match Event::new(HOSTS_EVENT, snapshot.as_ref()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::error!("Failed to encode host table: {}", e);
                None
            }
        }
    }

    /// Serialized [`Self::hosts_event`], as pushed to new subscribers.
    pub fn hosts_frame(&self) -> Option<String> {
        self.hosts_event()?.to_frame().ok()
    }

    /// Run one cycle, waiting for any cycle already in flight to finish first.
    pub async fn run_cycle(&self) -> Result<CycleReport, DiscoveryError> {
        let _guard = self.cycle.lock().await;
        self.guarded_cycle().await
    }

    /// Run one cycle unless another is in flight.
    pub async fn try_run_cycle(&self) -> Result<CycleReport, DiscoveryError> {
        let Ok(_guard) = self.cycle.try_lock() else {
            tracing::warn!("Discovery trigger ignored: a cycle is already running");
            return Err(DiscoveryError::CycleInProgress);
        };
        self.guarded_cycle().await
    }

    async fn guarded_cycle(&self) -> Result<CycleReport, DiscoveryError> {
        let result = self.discover().await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!("Discovery cycle aborted, host table is stale: {}", e);
            } else {
                tracing::warn!("Discovery cycle aborted: {}", e);
            }
            self.set_state(EngineState::Idle);
            // Subscribers keep seeing a complete, if old, table.
            if let Some(event) = self.hosts_event() {
                self.hub.publish(&event);
            }
        }
        result
    }

    async fn discover(&self) -> Result<CycleReport, DiscoveryError> {
        let start = Instant::now();

        // Idle -> Sweeping
        self.set_state(EngineState::Sweeping);
        let interfaces = self.source.interfaces().await.map_err(|e| {
            tracing::warn!("Interface enumeration failed: {:#}", e);
            DiscoveryError::NoInterfaceFound
        })?;
        let vantage = select_vantage_point(&interfaces)?;
        tracing::info!(
            "Vantage point {} ({}) on {}",
            vantage.address,
            vantage.hardware_address.as_deref().unwrap_or("no MAC"),
            vantage.interface
        );

        let vendors = self.vendor_directory().await;
        let vendor_of = |mac: Option<&str>| -> Option<String> {
            let directory = vendors.as_deref()?;
            directory.lookup(mac?)
        };

        let own_address = vantage.address.to_string();
        let mut own = Host::new(own_address.clone(), vantage.hardware_address.clone());
        own.vendor = vendor_of(own.hardware_address.as_deref());
        let mut table = vec![own];

        let neighbors = self.source.sweep(&vantage.subnet).await?;

        // Sweeping -> Correlating
        self.set_state(EngineState::Correlating);
        let mut seen: HashSet<String> = HashSet::from([own_address]);
        for neighbor in neighbors {
            if !seen.insert(neighbor.address.clone()) {
                tracing::debug!("Skipping duplicate host {}", neighbor.address);
                continue;
            }
            let hardware_address = neighbor.hardware_address.map(|m| m.to_uppercase());
            let mut host = Host::new(neighbor.address, hardware_address);
            host.vendor = vendor_of(host.hardware_address.as_deref());
            table.push(host);
        }
        // Stable; `None` orders before any vendor name.
        table.sort_by(|a, b| a.vendor.cmp(&b.vendor));
        self.persist(&table);

        // Correlating -> Classifying
        self.set_state(EngineState::Classifying);
        let (services, classification_degraded) = match self.source.browse().await {
            Ok(records) => {
                for host in table.iter_mut() {
                    let own = records
                        .iter()
                        .filter(|r| r.address.as_deref() == Some(host.address.as_str()));
                    host.device_type = classify(&self.rules, own);
                }
                (records.len(), false)
            }
            Err(e) => {
                tracing::warn!("Service discovery unavailable, device types left Unknown: {}", e);
                (0, true)
            }
        };
        let classified = table
            .iter()
            .filter(|h| h.device_type != crate::scanner::UNKNOWN_DEVICE_TYPE)
            .count();

        // Classifying -> Published
        let hosts = table.len();
        self.replace_table(table);
        let subscribers = match self.hosts_event() {
            Some(event) => self.hub.publish(&event),
            None => 0,
        };
        self.set_state(EngineState::Published);

        let report = CycleReport {
            vantage,
            hosts,
            services,
            classified,
            classification_degraded,
            vendors_degraded: vendors.is_none(),
            subscribers,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            "Cycle complete: {} hosts ({} classified), {} records, {} subscribers, {:.1}s",
            report.hosts,
            report.classified,
            report.services,
            report.subscribers,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Vendor table, loaded on first use. A failed load is retried next cycle.
    async fn vendor_directory(&self) -> Option<Arc<VendorDirectory>> {
        let result = self
            .vendors
            .get_or_try_init(|| async { self.source.load_vendors().await.map(Arc::new) })
            .await;
        match result {
            Ok(directory) => Some(directory.clone()),
            Err(e) => {
                tracing::warn!("Vendor lookups disabled for this cycle: {}", e);
                None
            }
        }
    }

    fn replace_table(&self, hosts: Vec<Host>) {
        let table = Arc::new(hosts);
        *self
            .hosts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = table;
    }

    fn persist(&self, hosts: &[Host]) {
        if let Some(path) = &self.store {
            if let Err(e) = persistence::save_hosts(path, hosts) {
                tracing::warn!("Failed to persist host table: {:#}", e);
            }
        }
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!("Engine state: {} -> {}", *state, next);
        *state = next;
    }
}
