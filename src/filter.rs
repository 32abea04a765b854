//! Threat classifier for WiFi and BLE observations.
//!
//! Pure functions over an [`Observation`] and a [`ThreatRules`] set: no I/O,
//! no state, same input always gives the same [`Classification`].

use serde::Serialize;

use crate::observation::{Observation, RadioKind};
use crate::rules::ThreatRules;

/// Outcome of scoring one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// 0 = no match (discard), 1..=3 ascending confidence.
    pub threat_level: u8,
    /// Label of the rule branch that fired.
    pub reason: Option<&'static str>,
}

impl Classification {
    pub const NONE: Classification = Classification {
        threat_level: 0,
        reason: None,
    };

    const fn hit(threat_level: u8, reason: &'static str) -> Self {
        Self {
            threat_level,
            reason: Some(reason),
        }
    }

    pub fn is_match(&self) -> bool {
        self.threat_level > 0
    }
}

pub const REASON_SSID_AND_MAC: &str = "SSID + MAC prefix";
pub const REASON_SSID: &str = "SSID";
pub const REASON_MAC: &str = "MAC prefix";
pub const REASON_SERVICE_UUID: &str = "Service UUID";
pub const REASON_BLE_NAME_AND_MAC: &str = "BLE Name + MAC prefix";
pub const REASON_BLE_NAME: &str = "BLE Name";
pub const REASON_BLE_MAC: &str = "BLE MAC prefix";

/// Score an observation against the rule set.
pub fn classify(observation: &Observation, rules: &ThreatRules) -> Classification {
    match observation.kind {
        RadioKind::Wifi => classify_wifi(observation, rules),
        RadioKind::BluetoothLe => classify_ble(observation, rules),
    }
}

/// WiFi: SSID and MAC prefix both count for level 2 on their own.
pub fn classify_wifi(observation: &Observation, rules: &ThreatRules) -> Classification {
    let name_match = observation
        .matchable_name()
        .and_then(|name| rules.match_wifi_name(name))
        .is_some();
    let mac_match = rules
        .match_mac_prefix(&observation.hardware_address)
        .is_some();

    match (name_match, mac_match) {
        (true, true) => Classification::hit(3, REASON_SSID_AND_MAC),
        (true, false) => Classification::hit(2, REASON_SSID),
        (false, true) => Classification::hit(2, REASON_MAC),
        (false, false) => Classification::NONE,
    }
}

/// BLE: a service UUID fingerprint is decisive. A MAC prefix on its own is
/// weaker evidence here than on WiFi and only scores level 1.
pub fn classify_ble(observation: &Observation, rules: &ThreatRules) -> Classification {
    if rules
        .match_service(&observation.service_identifiers)
        .is_some()
    {
        return Classification::hit(3, REASON_SERVICE_UUID);
    }

    let name_match = observation
        .matchable_name()
        .and_then(|name| rules.match_ble_name(name))
        .is_some();
    let mac_match = rules
        .match_mac_prefix(&observation.hardware_address)
        .is_some();

    match (name_match, mac_match) {
        (true, true) => Classification::hit(3, REASON_BLE_NAME_AND_MAC),
        (true, false) => Classification::hit(2, REASON_BLE_NAME),
        (false, true) => Classification::hit(1, REASON_BLE_MAC),
        (false, false) => Classification::NONE,
    }
}
