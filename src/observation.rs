//! Uniform observation shape produced by the normalizer for every radio event.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display label given to WiFi networks that broadcast an empty SSID.
pub const HIDDEN_NETWORK: &str = "Hidden Network";

/// Placeholder address for BLE reports without a resolvable address.
pub const UNKNOWN_ADDRESS: &str = "UNKNOWN";

/// Which radio produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioKind {
    Wifi,
    BluetoothLe,
}

impl RadioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioKind::Wifi => "wifi",
            RadioKind::BluetoothLe => "bluetooth_le",
        }
    }

    /// Inverse of [`RadioKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wifi" => Some(RadioKind::Wifi),
            "bluetooth_le" => Some(RadioKind::BluetoothLe),
            _ => None,
        }
    }
}

/// One sighting of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub kind: RadioKind,
    /// Canonical hardware address, see [`canonical_address`].
    pub hardware_address: String,
    pub display_name: Option<String>,
    /// Set when the display name is the [`HIDDEN_NETWORK`] sentinel rather
    /// than a broadcast name.
    pub hidden: bool,
    /// Lower-cased service UUIDs (BLE only).
    pub service_identifiers: BTreeSet<String>,
    /// RSSI in dBm.
    pub signal_strength: i32,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Name used for pattern matching: hidden, absent and empty names never match.
    pub fn matchable_name(&self) -> Option<&str> {
        if self.hidden {
            return None;
        }
        self.display_name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Canonical form of a hardware address: trimmed, `-` separators turned into
/// `:`, upper case. `58-8e-81-aa-bb-cc` and `58:8E:81:AA:BB:CC` dedup together.
pub fn canonical_address(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == '-' { ':' } else { c.to_ascii_uppercase() })
        .collect()
}
