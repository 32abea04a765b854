//! Scan session: the engine, lifecycle coordinator, persistence worker and
//! durable store wired together behind the commands an observer issues.

use std::sync::{mpsc, Arc};

use crate::clock::Clock;
use crate::config::ScannerConfig;
use crate::coordinator::{ScanCoordinator, ScanState};
use crate::detection::{Detection, DetectionList, Location, ScanSummary};
use crate::engine::ScanEngine;
use crate::error::{LifecycleError, StoreResult};
use crate::merge::MergePolicy;
use crate::persist::Persister;
use crate::radio::{BleRadio, PermissionSource, WifiRadio};
use crate::store::{DetectionStore, SettingsStore};

/// Host-provided radios and permission source.
pub struct Radios {
    pub wifi: Arc<dyn WifiRadio>,
    pub ble: Arc<dyn BleRadio>,
    pub permissions: Arc<dyn PermissionSource>,
}

pub struct ScanSession {
    engine: Arc<ScanEngine>,
    coordinator: ScanCoordinator,
    persister: Persister,
    store: Arc<dyn DetectionStore>,
}

impl ScanSession {
    pub fn new(
        config: ScannerConfig,
        radios: Radios,
        store: Arc<dyn DetectionStore>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LifecycleError> {
        let (wifi_n, ble_n, prefix_n, uuid_n) = config.rules.counts();
        log::info!(
            "Rules loaded: {wifi_n} SSID patterns, {ble_n} BLE name patterns, \
             {prefix_n} MAC prefixes, {uuid_n} service UUID fragments"
        );

        let rescan_interval = config.rescan_interval();
        let engine = Arc::new(ScanEngine::new(config.rules, clock));
        let persister = Persister::spawn(
            Arc::clone(&store),
            settings,
            config.merge_policy,
            config.auto_persist,
        )?;
        engine.subscribe_with(persister.snapshot_sink());

        let coordinator = ScanCoordinator::new(
            Arc::clone(&engine),
            radios.wifi,
            radios.ble,
            radios.permissions,
            rescan_interval,
        );

        Ok(Self {
            engine,
            coordinator,
            persister,
            store,
        })
    }

    pub fn engine(&self) -> &Arc<ScanEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.coordinator
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn start(&self) -> Result<(), LifecycleError> {
        self.coordinator.start_scanning()
    }

    pub fn stop(&self) {
        self.coordinator.stop_scanning();
    }

    pub fn state(&self) -> ScanState {
        self.coordinator.state()
    }

    pub fn is_scanning(&self) -> bool {
        self.coordinator.is_scanning()
    }

    // ── Live set ────────────────────────────────────────────────────

    pub fn clear(&self) {
        self.engine.clear();
    }

    pub fn remove(&self, address: &str) -> bool {
        self.engine.remove(address)
    }

    pub fn set_location(&self, latitude: f64, longitude: f64) {
        self.engine.set_location(latitude, longitude);
    }

    pub fn location(&self) -> Option<Location> {
        self.engine.location()
    }

    pub fn current(&self) -> DetectionList {
        self.engine.current()
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary::from_detections(&self.engine.current())
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn auto_persist(&self) -> bool {
        self.persister.auto_persist()
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.persister.policy()
    }

    pub fn set_auto_persist(&self, enabled: bool) {
        self.persister.set_auto_persist(enabled, self.engine.current());
    }

    pub fn persist_now(&self) {
        self.persister.persist_now(self.engine.current());
    }

    /// Wait for queued persistence work to finish.
    pub fn flush(&self) {
        self.persister.flush();
    }

    pub fn saved(&self) -> StoreResult<Vec<Detection>> {
        self.store.all_newest_first()
    }

    pub fn delete_saved(&self, detection: &Detection) -> StoreResult<bool> {
        self.store.delete(detection)
    }

    pub fn clear_saved(&self) -> StoreResult<()> {
        self.store.delete_all()
    }

    // ── Subscriptions ───────────────────────────────────────────────

    pub fn subscribe_detections(&self) -> mpsc::Receiver<DetectionList> {
        self.engine.subscribe()
    }

    pub fn subscribe_location(&self) -> mpsc::Receiver<Option<Location>> {
        self.engine.subscribe_location()
    }

    pub fn subscribe_scanning(&self) -> mpsc::Receiver<bool> {
        self.coordinator.subscribe_scanning()
    }

    pub fn subscribe_saved(&self) -> mpsc::Receiver<DetectionList> {
        self.store.subscribe()
    }

    /// Stop scanning, then let in-flight persistence finish.
    pub fn shutdown(&self) {
        self.coordinator.stop_scanning();
        self.persister.shutdown();
    }
}
