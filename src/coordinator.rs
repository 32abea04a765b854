//! Scan lifecycle: Idle <-> Scanning.
//!
//! Starting attaches the BLE sink and the WiFi results listener, pulls the
//! current WiFi results once and spawns the re-scan ticker. Stopping undoes
//! all of it and joins the ticker. Start and stop are serialized and both are
//! no-ops when already in the target state.

use std::sync::{mpsc, Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::engine::ScanEngine;
use crate::error::LifecycleError;
use crate::observable::Observable;
use crate::radio::{BleEvent, BleRadio, PermissionSource, WifiRadio};
use crate::scanner::{normalize_ble, normalize_wifi};

/// Default WiFi re-scan period.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest re-scan period the ticker will run with.
pub const MIN_RESCAN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
}

struct Ticker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ScanCoordinator {
    engine: Arc<ScanEngine>,
    wifi: Arc<dyn WifiRadio>,
    ble: Arc<dyn BleRadio>,
    permissions: Arc<dyn PermissionSource>,
    rescan_interval: Duration,
    scanning: Observable<bool>,
    /// Held for the whole of a start/stop transition.
    ticker: Mutex<Option<Ticker>>,
}

impl ScanCoordinator {
    pub fn new(
        engine: Arc<ScanEngine>,
        wifi: Arc<dyn WifiRadio>,
        ble: Arc<dyn BleRadio>,
        permissions: Arc<dyn PermissionSource>,
        rescan_interval: Duration,
    ) -> Self {
        if rescan_interval < MIN_RESCAN_INTERVAL {
            log::warn!(
                "Re-scan interval {rescan_interval:?} too short, using {MIN_RESCAN_INTERVAL:?}"
            );
        }
        let rescan_interval = rescan_interval.max(MIN_RESCAN_INTERVAL);
        Self {
            engine,
            wifi,
            ble,
            permissions,
            rescan_interval,
            scanning: Observable::new(false),
            ticker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ScanState {
        if self.is_scanning() {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    pub fn subscribe_scanning(&self) -> mpsc::Receiver<bool> {
        self.scanning.subscribe()
    }

    pub fn start_scanning(&self) -> Result<(), LifecycleError> {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            log::debug!("start_scanning: already scanning");
            return Ok(());
        }

        let location = self.permissions.location_granted();
        let ble_scan = self.permissions.ble_scan_granted();
        if !(location && ble_scan) {
            log::warn!("Cannot start scanning: location={location}, ble_scan={ble_scan}");
            return Err(LifecycleError::PermissionDenied { location, ble_scan });
        }

        // ── BLE ─────────────────────────────────────────────────────
        let engine = Arc::clone(&self.engine);
        let sink = Arc::new(move |event: BleEvent| match event {
            BleEvent::Advertisement(adv) => {
                engine.ingest(normalize_ble(&adv, engine.clock().now()));
            }
            BleEvent::ScanFailed(code) => log::error!("BLE scan failed with code {code}"),
        });
        if let Err(e) = self.ble.start(sink) {
            log::error!("BLE scan start failed: {e}");
        }

        // ── WiFi ────────────────────────────────────────────────────
        let engine = Arc::clone(&self.engine);
        let radio: Weak<dyn WifiRadio> = Arc::downgrade(&self.wifi);
        let permissions = Arc::clone(&self.permissions);
        let listener = Arc::new(move || {
            if let Some(radio) = radio.upgrade() {
                pull_wifi_results(&engine, radio.as_ref(), permissions.as_ref());
            }
        });
        if let Err(e) = self.wifi.register_listener(listener) {
            log::error!("WiFi listener registration failed: {e}");
        }
        pull_wifi_results(&self.engine, self.wifi.as_ref(), self.permissions.as_ref());

        match self.spawn_ticker() {
            Ok(t) => *ticker = Some(t),
            Err(e) => {
                log::error!("Failed to spawn re-scan ticker: {e}");
                self.detach_radios();
                return Err(LifecycleError::Spawn(e));
            }
        }

        self.scanning.set(true);
        log::info!("Scanning started (re-scan every {:?})", self.rescan_interval);
        Ok(())
    }

    pub fn stop_scanning(&self) {
        let mut ticker = self.ticker.lock();
        let Some(t) = ticker.take() else {
            log::debug!("stop_scanning: not scanning");
            return;
        };

        let _ = t.stop_tx.send(());
        if t.handle.join().is_err() {
            log::error!("Re-scan ticker panicked");
        }
        self.detach_radios();

        self.scanning.set(false);
        log::info!("Scanning stopped");
    }

    /// Pull the current WiFi results into the engine now.
    pub fn refresh_wifi(&self) {
        pull_wifi_results(&self.engine, self.wifi.as_ref(), self.permissions.as_ref());
    }

    fn detach_radios(&self) {
        if let Err(e) = self.ble.stop() {
            log::error!("BLE scan stop failed: {e}");
        }
        if let Err(e) = self.wifi.unregister_listener() {
            log::warn!("WiFi listener unregister failed: {e}");
        }
    }

    fn spawn_ticker(&self) -> std::io::Result<Ticker> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let wifi = Arc::clone(&self.wifi);
        let permissions = Arc::clone(&self.permissions);
        let interval = self.rescan_interval;
        let handle = thread::Builder::new()
            .name("rescan".into())
            .spawn(move || rescan_thread(stop_rx, wifi, permissions, interval))?;
        Ok(Ticker { stop_tx, handle })
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        self.stop_scanning();
    }
}

fn pull_wifi_results(
    engine: &ScanEngine,
    wifi: &dyn WifiRadio,
    permissions: &dyn PermissionSource,
) {
    if !permissions.location_granted() {
        log::error!("WiFi scan results need location permission");
        return;
    }
    match wifi.scan_results() {
        Ok(records) => {
            let observations = normalize_wifi(&records, engine.clock().now());
            let matched = engine.ingest_batch(observations);
            log::debug!("WiFi pull: {} record(s), {matched} match(es)", records.len());
        }
        Err(e) => log::warn!("WiFi scan results unavailable: {e}"),
    }
}

fn rescan_thread(
    stop_rx: mpsc::Receiver<()>,
    wifi: Arc<dyn WifiRadio>,
    permissions: Arc<dyn PermissionSource>,
    interval: Duration,
) {
    log::debug!("Re-scan ticker started");
    loop {
        if permissions.location_granted() {
            if let Err(e) = wifi.start_scan() {
                log::warn!("WiFi start_scan failed: {e}");
            }
        }
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Re-scan ticker stopped");
}
