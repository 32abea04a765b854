//! Error types for the I/O boundary.
//!
//! Classification and fusion never fail; everything fallible sits at the
//! edges (durable store, radios, lifecycle, config files) and gets its own
//! `thiserror` enum here.

use thiserror::Error;

/// Durable store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be turned back into a detection.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON encoding of a stored column or setting failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while opening the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Radio subsystem failures reported by host adapters.
#[derive(Debug, Error)]
pub enum RadioError {
    /// Unregistering a listener that is not registered (double unregister).
    #[error("listener not registered")]
    ListenerNotRegistered,

    /// The platform reported a scan error code.
    #[error("scan failed with code {0}")]
    ScanFailed(i32),

    /// The radio is missing or switched off.
    #[error("radio unavailable: {0}")]
    Unavailable(String),
}

/// Scan lifecycle failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Location or BLE scan authorization is missing.
    #[error("missing permissions (location={location}, ble_scan={ble_scan})")]
    PermissionDenied { location: bool, ble_scan: bool },

    /// The WiFi re-scan ticker thread could not be spawned.
    #[error("failed to spawn re-scan ticker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Configuration and rule file loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// File contents are not valid JSON for the expected shape.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override had an unparseable value.
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },

    /// A field parsed but its value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
