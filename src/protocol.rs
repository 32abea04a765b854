/// JSON message protocol between the scanner daemon and its host.
///
/// All messages are newline-delimited JSON (NDJSON). Inbound lines are either
/// host commands (tagged by `cmd`) or radio feed records (tagged by `type`);
/// outbound lines are device messages (tagged by `type`).
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::detection::{Detection, Location};
use crate::scanner::{BleAdvertisement, WifiScanRecord};

/// Commands sent from the host to the scanner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostCommand {
    /// Start scanning
    Start,
    /// Stop scanning
    Stop,
    /// Empty the live detection list
    Clear,
    /// Drop one live detection
    Remove { address: String },
    /// Switch automatic persistence
    SetAutoPersist { enabled: bool },
    /// Save the current live list once
    PersistNow,
    /// Location fix used to tag new detections
    SetLocation { lat: f64, lng: f64 },
    /// Request current status
    GetStatus,
    /// Request the saved history
    GetSaved,
    /// Delete one saved record by id
    DeleteSaved { id: i64 },
    /// Delete the whole saved history
    ClearSaved,
}

/// Radio records pushed by the host's radio adapter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RadioFeed {
    /// One WiFi scan-result pull
    WifiResults { results: Vec<WifiScanRecord> },
    /// One decoded BLE advertisement
    BleAdv(BleAdvertisement),
    /// One raw BLE advertisement, AD structures as hex
    BleRaw {
        #[serde(default)]
        address: Option<String>,
        rssi: i32,
        data: String,
    },
    /// BLE scan failure code from the platform
    BleFailed { code: i32 },
}

/// Any inbound NDJSON line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Command(HostCommand),
    Feed(RadioFeed),
}

/// Messages sent from the scanner to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage<'a> {
    /// A live detection was added or refreshed
    Detection {
        mac: &'a str,
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
        rssi: i32,
        threat: u8,
        threat_label: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<&'a str>,
        /// Primary service UUID if advertised
        #[serde(skip_serializing_if = "Option::is_none")]
        uuid: Option<&'a str>,
        /// Vendor for a known OUI prefix
        #[serde(skip_serializing_if = "Option::is_none")]
        vendor: Option<&'static str>,
        lat: f64,
        lng: f64,
        /// Rough distance estimate from RSSI, metres
        distance_m: f64,
        /// Detection time, Unix milliseconds
        ts: i64,
    },
    /// A new target showed up
    Alert {
        count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_target: Option<&'a str>,
    },
    /// Scanner status report
    Status {
        scanning: bool,
        auto_persist: bool,
        /// Live detection count
        detections: usize,
        /// Saved record count
        saved: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
        /// Uptime in seconds
        uptime: u64,
        version: &'static str,
    },
    /// Saved history, newest first
    Saved { detections: Vec<Detection> },
    /// Radio adapter: run a WiFi scan now
    WifiScan,
    /// Radio adapter: which radios the scanner currently listens to
    Radio { ble: bool, wifi_listener: bool },
    /// A command or feed line could not be handled
    Error { message: String },
}

impl<'a> DeviceMessage<'a> {
    pub fn detection(d: &'a Detection) -> Self {
        DeviceMessage::Detection {
            mac: &d.hardware_address,
            kind: d.kind.as_str(),
            name: d.display_name.as_deref(),
            rssi: d.signal_strength,
            threat: d.threat_level,
            threat_label: d.threat_label(),
            reason: d.reason.as_deref(),
            uuid: d.primary_service(),
            vendor: defaults::vendor_for(&d.hardware_address),
            lat: d.latitude,
            lng: d.longitude,
            distance_m: (d.estimated_distance_m() * 10.0).round() / 10.0,
            ts: d.timestamp.timestamp_millis(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        DeviceMessage::Error {
            message: message.into(),
        }
    }
}

/// Scanner version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum length of one inbound NDJSON line
pub const MAX_LINE_LEN: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::RadioKind;
    use crate::scanner::DeviceName;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    // ── HostCommand parsing ─────────────────────────────────────────

    #[test]
    fn parse_simple_commands() {
        let cmd: HostCommand = serde_json::from_str(r#"{"cmd":"start"}"#).unwrap();
        assert_eq!(cmd, HostCommand::Start);
        let cmd: HostCommand = serde_json::from_str(r#"{"cmd":"persist_now"}"#).unwrap();
        assert_eq!(cmd, HostCommand::PersistNow);
    }

    #[test]
    fn parse_commands_with_fields() {
        let cmd: HostCommand =
            serde_json::from_str(r#"{"cmd":"set_location","lat":45.5,"lng":-122.6}"#).unwrap();
        assert_eq!(cmd, HostCommand::SetLocation { lat: 45.5, lng: -122.6 });
        let cmd: HostCommand =
            serde_json::from_str(r#"{"cmd":"set_auto_persist","enabled":true}"#).unwrap();
        assert_eq!(cmd, HostCommand::SetAutoPersist { enabled: true });
        let cmd: HostCommand =
            serde_json::from_str(r#"{"cmd":"remove","address":"58:8e:81:00:00:01"}"#).unwrap();
        assert_eq!(
            cmd,
            HostCommand::Remove {
                address: "58:8e:81:00:00:01".into()
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<HostCommand>(r#"{"cmd":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<HostCommand>(r#"{"cmd":"remove"}"#).is_err());
    }

    // ── Radio feed parsing ──────────────────────────────────────────

    #[test]
    fn parse_wifi_feed() {
        let line = r#"{"type":"wifi_results","results":[{"ssid":"Flock-1","bssid":"58:8E:81:00:00:01","level":-60},{"ssid":"","bssid":"AA:BB:CC:DD:EE:FF","level":-70}]}"#;
        let Inbound::Feed(RadioFeed::WifiResults { results }) =
            serde_json::from_str::<Inbound>(line).unwrap()
        else {
            panic!("expected wifi feed");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].ssid.as_deref(), Some(""));
    }

    #[test]
    fn parse_ble_feed() {
        let line = r#"{"type":"ble_adv","address":"11:22:33:44:55:66","advertised_name":"Penguin","device_name":"restricted","service_uuids":[],"rssi":-70}"#;
        let Inbound::Feed(RadioFeed::BleAdv(adv)) = serde_json::from_str::<Inbound>(line).unwrap()
        else {
            panic!("expected ble feed");
        };
        assert_eq!(adv.device_name, DeviceName::Restricted);
        assert_eq!(adv.rssi, -70);

        let line = r#"{"type":"ble_adv","rssi":-70,"device_name":{"known":"Flock"}}"#;
        let Inbound::Feed(RadioFeed::BleAdv(adv)) = serde_json::from_str::<Inbound>(line).unwrap()
        else {
            panic!("expected ble feed");
        };
        assert_eq!(adv.device_name, DeviceName::Known("Flock".into()));
        assert_eq!(adv.address, None);
    }

    #[test]
    fn inbound_distinguishes_commands_from_feed() {
        assert_eq!(
            serde_json::from_str::<Inbound>(r#"{"cmd":"stop"}"#).unwrap(),
            Inbound::Command(HostCommand::Stop)
        );
        assert_eq!(
            serde_json::from_str::<Inbound>(r#"{"type":"ble_failed","code":2}"#).unwrap(),
            Inbound::Feed(RadioFeed::BleFailed { code: 2 })
        );
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"zigbee"}"#).is_err());
    }

    // ── DeviceMessage serialization ─────────────────────────────────

    fn flock_detection() -> Detection {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Detection {
            id: None,
            kind: RadioKind::Wifi,
            hardware_address: "58:8E:81:AA:BB:CC".into(),
            display_name: Some("Flock-Cam-12".into()),
            service_identifiers: BTreeSet::new(),
            signal_strength: -70,
            observed_at: at,
            latitude: 45.5,
            longitude: -122.6,
            threat_level: 3,
            reason: Some("SSID + MAC prefix".into()),
            timestamp: at,
        }
    }

    #[test]
    fn serialize_detection_message() {
        let d = flock_detection();
        let json = serde_json::to_string(&DeviceMessage::detection(&d)).unwrap();
        assert!(json.contains(r#""type":"detection""#));
        assert!(json.contains(r#""mac":"58:8E:81:AA:BB:CC""#));
        assert!(json.contains(r#""kind":"wifi""#));
        assert!(json.contains(r#""threat":3"#));
        assert!(json.contains(r#""threat_label":"High""#));
        assert!(json.contains(r#""vendor":"Silicon Labs""#));
        assert!(json.contains(r#""distance_m":10.0"#));
        assert!(json.contains(r#""ts":1735689600000"#));
        // uuid should be omitted when absent
        assert!(!json.contains("uuid"));
    }

    #[test]
    fn serialize_alert_and_status() {
        let json = serde_json::to_string(&DeviceMessage::Alert {
            count: 2,
            last_target: Some("Penguin"),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"alert","count":2,"last_target":"Penguin"}"#);

        let json = serde_json::to_string(&DeviceMessage::Status {
            scanning: true,
            auto_persist: false,
            detections: 3,
            saved: 1,
            location: None,
            uptime: 120,
            version: "0.1.0",
        })
        .unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""scanning":true"#));
        assert!(!json.contains("location"));
    }

    #[test]
    fn serialize_radio_requests() {
        let json = serde_json::to_string(&DeviceMessage::WifiScan).unwrap();
        assert_eq!(json, r#"{"type":"wifi_scan"}"#);
        let json = serde_json::to_string(&DeviceMessage::Radio {
            ble: true,
            wifi_listener: false,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"radio","ble":true,"wifi_listener":false}"#);
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION should be semver (major.minor.patch)");
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
