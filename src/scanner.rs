//! Radio record normalizer.
//!
//! WiFi: scan-result records pulled from the radio after each scan cycle.
//! BLE: one advertisement record per callback, either already decoded by the
//! host stack or raw AD bytes decoded here by [`BleAdvParser`].
//!
//! Both are turned into the uniform [`Observation`] the classifier scores.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use heapless::Vec as BoundedVec;
use serde::{Deserialize, Serialize};

use crate::observation::{
    canonical_address, Observation, RadioKind, HIDDEN_NETWORK, UNKNOWN_ADDRESS,
};

/// One visible access point from a WiFi scan result pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiScanRecord {
    /// Broadcast SSID. `Some("")` is a hidden network, `None` is unknown.
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bssid: Option<String>,
    /// RSSI in dBm.
    pub level: i32,
}

/// Name the host stack reports for a BLE device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceName {
    Known(String),
    /// Not reported.
    #[default]
    Absent,
    /// Unreadable because the platform gates it behind a permission.
    Restricted,
}

/// One BLE advertisement callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleAdvertisement {
    #[serde(default)]
    pub address: Option<String>,
    /// Local name carried in the advertisement payload.
    #[serde(default)]
    pub advertised_name: Option<String>,
    /// Name cached by the host stack for this device.
    #[serde(default)]
    pub device_name: DeviceName,
    #[serde(default)]
    pub service_uuids: Vec<String>,
    pub rssi: i32,
}

/// Normalize one WiFi scan-result pull. Records without a BSSID are dropped.
pub fn normalize_wifi(records: &[WifiScanRecord], now: DateTime<Utc>) -> Vec<Observation> {
    records
        .iter()
        .filter_map(|record| {
            let Some(bssid) = record.bssid.as_deref().filter(|b| !b.trim().is_empty()) else {
                log::debug!("Dropping WiFi record without BSSID (ssid={:?})", record.ssid);
                return None;
            };
            let hidden = matches!(record.ssid.as_deref(), Some(""));
            let display_name = if hidden {
                Some(HIDDEN_NETWORK.to_string())
            } else {
                record.ssid.clone()
            };
            Some(Observation {
                kind: RadioKind::Wifi,
                hardware_address: canonical_address(bssid),
                display_name,
                hidden,
                service_identifiers: BTreeSet::new(),
                signal_strength: record.level,
                observed_at: now,
            })
        })
        .collect()
}

/// Normalize one BLE advertisement.
///
/// Name fallback: advertised name, then the device-reported name, then
/// absent. A permission-gated device name is treated as absent.
pub fn normalize_ble(adv: &BleAdvertisement, now: DateTime<Utc>) -> Observation {
    let advertised = adv.advertised_name.as_deref().filter(|n| !n.is_empty());
    let reported = match &adv.device_name {
        DeviceName::Known(name) if !name.is_empty() => Some(name.as_str()),
        DeviceName::Known(_) | DeviceName::Absent => None,
        DeviceName::Restricted => {
            log::trace!("BLE device name restricted for {:?}", adv.address);
            None
        }
    };

    let hardware_address = adv
        .address
        .as_deref()
        .map(canonical_address)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

    Observation {
        kind: RadioKind::BluetoothLe,
        hardware_address,
        display_name: advertised.or(reported).map(String::from),
        hidden: false,
        service_identifiers: adv.service_uuids.iter().map(|u| u.to_lowercase()).collect(),
        signal_strength: adv.rssi,
        observed_at: now,
    }
}

/// Bluetooth base UUID suffix for expanding 16/32-bit service UUIDs.
const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Upper bound on service UUIDs kept from one advertisement.
pub const MAX_ADV_UUIDS: usize = 8;

/// Upper bound on local name bytes kept from one advertisement.
pub const MAX_ADV_NAME: usize = 32;

/// Parse BLE advertisement data (AD structures) into a [`BleAdvertisement`].
///
/// AD structure format: [length] [type] [data...]
/// Types we care about:
///   0x02/0x03 = Incomplete/Complete list of 16-bit service UUIDs
///   0x04/0x05 = Incomplete/Complete list of 32-bit service UUIDs
///   0x06/0x07 = Incomplete/Complete list of 128-bit service UUIDs
///   0x08/0x09 = Shortened/Complete local name
pub struct BleAdvParser;

impl BleAdvParser {
    /// `address` is the advertiser address as reported by the stack.
    /// `rssi` is the received signal strength.
    /// `ad_data` is the raw advertisement (and scan response) bytes.
    pub fn parse(address: Option<&str>, rssi: i32, ad_data: &[u8]) -> BleAdvertisement {
        let mut uuids: BoundedVec<String, MAX_ADV_UUIDS> = BoundedVec::new();
        let mut name: BoundedVec<u8, MAX_ADV_NAME> = BoundedVec::new();

        let mut pos = 0;
        while pos < ad_data.len() {
            let len = ad_data[pos] as usize;
            if len == 0 || pos + 1 + len > ad_data.len() {
                break;
            }

            let ad_type = ad_data[pos + 1];
            let data = &ad_data[pos + 2..pos + 1 + len];

            match ad_type {
                0x02 | 0x03 => {
                    for chunk in data.chunks_exact(2) {
                        let uuid = u16::from_le_bytes([chunk[0], chunk[1]]);
                        let _ = uuids.push(format!("{uuid:08x}{BASE_UUID_SUFFIX}"));
                    }
                }
                0x04 | 0x05 => {
                    for chunk in data.chunks_exact(4) {
                        let uuid = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        let _ = uuids.push(format!("{uuid:08x}{BASE_UUID_SUFFIX}"));
                    }
                }
                0x06 | 0x07 => {
                    for chunk in data.chunks_exact(16) {
                        let _ = uuids.push(format_uuid128(chunk));
                    }
                }
                0x08 | 0x09 => {
                    // Complete name wins over a shortened one seen earlier
                    if ad_type == 0x09 || name.is_empty() {
                        name.clear();
                        let take = data.len().min(MAX_ADV_NAME);
                        let _ = name.extend_from_slice(&data[..take]);
                    }
                }
                _ => {}
            }

            pos += 1 + len;
        }

        let advertised_name = core::str::from_utf8(&name)
            .ok()
            .filter(|n| !n.is_empty())
            .map(String::from);

        BleAdvertisement {
            address: address.map(String::from),
            advertised_name,
            device_name: DeviceName::Absent,
            service_uuids: uuids.into_iter().collect(),
            rssi,
        }
    }
}

/// Format a little-endian 128-bit UUID as 8-4-4-4-12 lower-case hex.
fn format_uuid128(le: &[u8]) -> String {
    let b: Vec<u8> = le.iter().rev().copied().collect();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}
