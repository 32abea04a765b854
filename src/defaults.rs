//! Default signature data for surveillance device detection.
//!
//! Flock Safety / Raven fingerprints: SSID and BLE name keywords, the Silicon
//! Labs OUI prefixes their radios ship with, and the Raven GATT service UUIDs.
//! All lists are plain strings so a rule file can replace any of them.

/// WiFi SSID substrings (case-insensitive).
pub static WIFI_NAME_PATTERNS: &[&str] = &["flock", "FS Ext Battery", "Penguin", "Pigvision"];

/// BLE device name substrings (case-insensitive).
pub static BLE_NAME_PATTERNS: &[&str] = &["FS Ext Battery", "Penguin", "Flock", "Pigvision"];

/// Known MAC OUI prefixes (first three octets, vendor name).
pub static MAC_PREFIXES: &[(&str, &str)] = &[
    ("58:8E:81", "Silicon Labs"),
    ("CC:CC:CC", "Silicon Labs"),
    ("EC:1B:BD", "Silicon Labs"),
    ("90:35:EA", "Silicon Labs"),
    ("04:0D:84", "Silicon Labs"),
    ("F0:82:C0", "Silicon Labs"),
    ("1C:34:F1", "Silicon Labs"),
    ("38:5B:44", "Silicon Labs"),
    ("94:34:69", "Silicon Labs"),
    ("B4:E3:F9", "Silicon Labs"),
    ("70:C9:4E", "Silicon Labs"),
    ("3C:91:80", "Silicon Labs"),
    ("D8:F3:BC", "Silicon Labs"),
    ("80:30:49", "Silicon Labs"),
    ("14:5A:FC", "Silicon Labs"),
    ("74:4C:A1", "Silicon Labs"),
    ("08:3A:88", "Silicon Labs"),
    ("9C:2F:9D", "Silicon Labs"),
    ("94:08:53", "Silicon Labs"),
    ("E4:AA:EA", "Silicon Labs"),
];

/// BLE service UUID fragments (case-insensitive substring of the full UUID).
///
/// Full UUID form: 0000XXXX-0000-1000-8000-00805f9b34fb
pub static SERVICE_UUID_FRAGMENTS: &[&str] = &[
    "0000180a", // Device Information
    "00003100", // Raven GPS service
    "00003200", // Raven Power service
    "00003300", // Raven Network service
    "00003400", // Raven Upload service
    "00003500", // Raven Error service
    "00001809", // Health Thermometer
    "00001819", // Location and Navigation
];

/// Vendor name for a canonical address, if its OUI is in [`MAC_PREFIXES`].
pub fn vendor_for(address: &str) -> Option<&'static str> {
    MAC_PREFIXES
        .iter()
        .find(|(prefix, _)| address.starts_with(prefix))
        .map(|&(_, vendor)| vendor)
}
