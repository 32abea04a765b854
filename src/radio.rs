//! Host radio and permission interfaces.
//!
//! The library never talks to hardware. A host implements these traits over
//! its platform stack; [`FeedRadio`] is the implementation used when records
//! arrive as data (the NDJSON daemon and tests).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RadioError;
use crate::scanner::{BleAdvertisement, WifiScanRecord};

/// Event delivered to the BLE sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    Advertisement(BleAdvertisement),
    /// Platform scan failure code. Logged, no retry.
    ScanFailed(i32),
}

pub type BleSink = Arc<dyn Fn(BleEvent) + Send + Sync>;
pub type WifiListener = Arc<dyn Fn() + Send + Sync>;

/// Request a [`FeedRadio`] passes on to whatever drives the real radios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioControl {
    /// Run a WiFi scan now.
    WifiScan,
    /// BLE sink or WiFi listener attached or detached.
    State { ble: bool, wifi_listener: bool },
}

pub type ControlSink = Arc<dyn Fn(RadioControl) + Send + Sync>;

pub trait WifiRadio: Send + Sync {
    /// Latest scan results.
    fn scan_results(&self) -> Result<Vec<WifiScanRecord>, RadioError>;
    /// Ask the radio for a fresh scan. Results arrive via the listener.
    fn start_scan(&self) -> Result<(), RadioError>;
    /// Called whenever new scan results are available.
    fn register_listener(&self, listener: WifiListener) -> Result<(), RadioError>;
    fn unregister_listener(&self) -> Result<(), RadioError>;
}

pub trait BleRadio: Send + Sync {
    fn start(&self, sink: BleSink) -> Result<(), RadioError>;
    fn stop(&self) -> Result<(), RadioError>;
}

/// Checked at the moment scanning starts, and by the ticker on every tick.
pub trait PermissionSource: Send + Sync {
    fn location_granted(&self) -> bool;
    fn ble_scan_granted(&self) -> bool;
}

/// Fixed permission answers.
#[derive(Debug)]
pub struct StaticPermissions {
    location: AtomicBool,
    ble_scan: AtomicBool,
}

impl StaticPermissions {
    pub fn new(location: bool, ble_scan: bool) -> Self {
        Self {
            location: AtomicBool::new(location),
            ble_scan: AtomicBool::new(ble_scan),
        }
    }

    pub fn granted() -> Self {
        Self::new(true, true)
    }

    pub fn set_location(&self, granted: bool) {
        self.location.store(granted, Ordering::Relaxed);
    }

    pub fn set_ble_scan(&self, granted: bool) {
        self.ble_scan.store(granted, Ordering::Relaxed);
    }
}

impl PermissionSource for StaticPermissions {
    fn location_granted(&self) -> bool {
        self.location.load(Ordering::Relaxed)
    }

    fn ble_scan_granted(&self) -> bool {
        self.ble_scan.load(Ordering::Relaxed)
    }
}

/// Radio fed from data instead of hardware.
///
/// WiFi results pushed with [`FeedRadio::push_wifi_results`] become the
/// current scan results and fire the registered listener. BLE events pushed
/// with [`FeedRadio::push_ble`] go to the sink while the BLE side is started
/// and are dropped otherwise. Scan triggers and attach/detach changes go out
/// through the control sink, if one is set.
#[derive(Default)]
pub struct FeedRadio {
    wifi_results: Mutex<Vec<WifiScanRecord>>,
    wifi_listener: Mutex<Option<WifiListener>>,
    ble_sink: Mutex<Option<BleSink>>,
    control: Mutex<Option<ControlSink>>,
    scan_requests: AtomicUsize,
    unregister_calls: AtomicUsize,
}

impl FeedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_control_sink(&self, sink: ControlSink) {
        *self.control.lock() = Some(sink);
    }

    fn send_control(&self, request: RadioControl) {
        let sink = self.control.lock().clone();
        if let Some(sink) = sink {
            sink(request);
        }
    }

    fn send_state(&self) {
        self.send_control(RadioControl::State {
            ble: self.ble_running(),
            wifi_listener: self.has_wifi_listener(),
        });
    }

    pub fn push_wifi_results(&self, results: Vec<WifiScanRecord>) {
        *self.wifi_results.lock() = results;
        let listener = self.wifi_listener.lock().clone();
        match listener {
            Some(listener) => listener(),
            None => log::trace!("WiFi results stored, no listener registered"),
        }
    }

    pub fn push_ble(&self, event: BleEvent) {
        let sink = self.ble_sink.lock().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    /// Number of `start_scan` calls so far.
    pub fn scan_requests(&self) -> usize {
        self.scan_requests.load(Ordering::Relaxed)
    }

    /// Number of `unregister_listener` calls so far, successful or not.
    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::Relaxed)
    }

    pub fn has_wifi_listener(&self) -> bool {
        self.wifi_listener.lock().is_some()
    }

    pub fn ble_running(&self) -> bool {
        self.ble_sink.lock().is_some()
    }
}

impl WifiRadio for FeedRadio {
    fn scan_results(&self) -> Result<Vec<WifiScanRecord>, RadioError> {
        Ok(self.wifi_results.lock().clone())
    }

    fn start_scan(&self) -> Result<(), RadioError> {
        self.scan_requests.fetch_add(1, Ordering::Relaxed);
        self.send_control(RadioControl::WifiScan);
        Ok(())
    }

    fn register_listener(&self, listener: WifiListener) -> Result<(), RadioError> {
        *self.wifi_listener.lock() = Some(listener);
        self.send_state();
        Ok(())
    }

    fn unregister_listener(&self) -> Result<(), RadioError> {
        self.unregister_calls.fetch_add(1, Ordering::Relaxed);
        let previous = self.wifi_listener.lock().take();
        match previous {
            Some(_) => {
                self.send_state();
                Ok(())
            }
            None => Err(RadioError::ListenerNotRegistered),
        }
    }
}

impl BleRadio for FeedRadio {
    fn start(&self, sink: BleSink) -> Result<(), RadioError> {
        *self.ble_sink.lock() = Some(sink);
        self.send_state();
        Ok(())
    }

    fn stop(&self) -> Result<(), RadioError> {
        let previous = self.ble_sink.lock().take();
        if previous.is_some() {
            self.send_state();
        }
        Ok(())
    }
}
