//! Detection records: what the live view shows and the saved history stores.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::Classification;
use crate::observation::{Observation, RadioKind};

/// Immutable snapshot of the live detection list, most recently updated first.
pub type DetectionList = Arc<Vec<Detection>>;

/// A geographic fix from the host's location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Tag used when no fix has ever been received.
    pub const UNKNOWN: Location = Location {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A classified observation tagged with location and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Storage identity, assigned by a durable write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub kind: RadioKind,
    pub hardware_address: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub service_identifiers: BTreeSet<String>,
    pub signal_strength: i32,
    pub observed_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub threat_level: u8,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Detection {
    pub fn from_observation(
        observation: Observation,
        classification: &Classification,
        location: Location,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            kind: observation.kind,
            hardware_address: observation.hardware_address,
            display_name: observation.display_name,
            service_identifiers: observation.service_identifiers,
            signal_strength: observation.signal_strength,
            observed_at: observation.observed_at,
            latitude: location.latitude,
            longitude: location.longitude,
            threat_level: classification.threat_level,
            reason: classification.reason.map(String::from),
            timestamp,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }

    /// First advertised service identifier, if any.
    pub fn primary_service(&self) -> Option<&str> {
        self.service_identifiers.iter().next().map(String::as_str)
    }

    /// Human-facing name: display name, else the hardware address.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.hardware_address)
    }

    pub fn threat_label(&self) -> &'static str {
        threat_label(self.threat_level)
    }

    pub fn estimated_distance_m(&self) -> f64 {
        estimate_distance_m(self.signal_strength)
    }
}

/// Short severity label for a threat level.
pub fn threat_label(level: u8) -> &'static str {
    match level {
        3 => "High",
        2 => "Med",
        1 => "Low",
        _ => "Unknown",
    }
}

/// RSSI at 1 m used by the distance estimate (dBm).
pub const REFERENCE_RSSI_1M: f64 = -40.0;

/// Path-loss exponent used by the distance estimate.
pub const PATH_LOSS_EXPONENT: f64 = 3.0;

/// Very rough distance in metres from RSSI (log-distance path loss model).
pub fn estimate_distance_m(rssi: i32) -> f64 {
    10f64.powf((REFERENCE_RSSI_1M - f64::from(rssi)) / (10.0 * PATH_LOSS_EXPONENT))
}

/// Notification-style digest of a live snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub count: usize,
    pub last_target: Option<String>,
}

impl ScanSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        Self {
            count: detections.len(),
            last_target: detections.first().map(|d| d.label().to_string()),
        }
    }

    /// True when `self` has more targets than `previous`, i.e. a new device
    /// showed up rather than an existing one being refreshed.
    pub fn is_new_target_since(&self, previous: &ScanSummary) -> bool {
        self.count > previous.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(address: &str, name: Option<&str>, rssi: i32) -> Detection {
        let now = Utc::now();
        Detection {
            id: None,
            kind: RadioKind::BluetoothLe,
            hardware_address: address.into(),
            display_name: name.map(String::from),
            service_identifiers: BTreeSet::new(),
            signal_strength: rssi,
            observed_at: now,
            latitude: 0.0,
            longitude: 0.0,
            threat_level: 2,
            reason: Some("BLE Name".into()),
            timestamp: now,
        }
    }

    #[test]
    fn label_falls_back_to_address() {
        assert_eq!(detection("AA", Some("Penguin"), -50).label(), "Penguin");
        assert_eq!(detection("AA", None, -50).label(), "AA");
        assert_eq!(detection("AA", Some(""), -50).label(), "AA");
    }

    #[test]
    fn threat_labels() {
        assert_eq!(threat_label(3), "High");
        assert_eq!(threat_label(2), "Med");
        assert_eq!(threat_label(1), "Low");
        assert_eq!(threat_label(0), "Unknown");
    }

    #[test]
    fn distance_is_one_metre_at_reference_and_grows_when_weaker() {
        assert!((estimate_distance_m(-40) - 1.0).abs() < 1e-9);
        assert!((estimate_distance_m(-70) - 10.0).abs() < 1e-9);
        assert!(estimate_distance_m(-90) > estimate_distance_m(-60));
    }

    #[test]
    fn primary_service_is_first_in_order() {
        let mut d = detection("AA", None, -50);
        d.service_identifiers.insert("0000180a-0000-1000-8000-00805f9b34fb".into());
        d.service_identifiers.insert("00003100-0000-1000-8000-00805f9b34fb".into());
        assert_eq!(
            d.primary_service(),
            Some("0000180a-0000-1000-8000-00805f9b34fb")
        );
    }

    #[test]
    fn summary_reports_head_and_growth() {
        let empty = ScanSummary::from_detections(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.last_target, None);

        let list = vec![detection("B", Some("Flock"), -40), detection("A", None, -70)];
        let summary = ScanSummary::from_detections(&list);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.last_target.as_deref(), Some("Flock"));
        assert!(summary.is_new_target_since(&empty));
        assert!(!summary.is_new_target_since(&summary.clone()));
    }
}
