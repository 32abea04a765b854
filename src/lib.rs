//! wtf-scanner library: portable surveillance device detection engine.
//!
//! Passively watches WiFi scan results and BLE advertisements, scores each
//! device against Flock Safety / Raven signatures (SSID and BLE name
//! patterns, Silicon Labs OUI prefixes, Raven GATT service UUIDs), keeps a
//! live de-duplicated list of matches tagged with the current location, and
//! merges them into a durable saved history.
//!
//! The library has no platform dependencies. Radios, permissions and the
//! clock are traits the host implements; the bundled `wtf-scanner` binary is
//! a thin Linux daemon that feeds radio records in and streams detections
//! out as NDJSON.
//!
//! Layers, leaf first:
//! - **Signatures**: `defaults`, `rules`, `filter`
//! - **Normalizer**: `observation`, `scanner`
//! - **Fusion**: `engine`, `observable`, `clock`, `detection`
//! - **Persistence**: `merge`, `persist`, `store`, `sqlite` (feature `sqlite`)
//! - **Lifecycle**: `radio`, `coordinator`, `session`, `config`
//! - **Host transport**: `protocol`, `comm`

pub mod clock;
pub mod comm;
pub mod config;
pub mod coordinator;
pub mod defaults;
pub mod detection;
pub mod engine;
pub mod error;
pub mod filter;
pub mod merge;
pub mod observable;
pub mod observation;
pub mod persist;
pub mod protocol;
pub mod radio;
pub mod rules;
pub mod scanner;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
