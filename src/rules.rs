//! Threat signature rule set.
//!
//! Holds the pattern lists the classifier in [`crate::filter`] evaluates.
//! Patterns are normalized once on construction (names and UUID fragments
//! lower-cased, MAC prefixes canonicalized) so matching is a plain
//! `contains` / `starts_with` per candidate.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::defaults;
use crate::error::ConfigError;
use crate::observation::canonical_address;

/// Classification rules. Build with [`ThreatRules::default`] for the
/// compiled-in signatures or load a JSON rule file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RuleFile")]
pub struct ThreatRules {
    wifi_name_patterns: Vec<String>,
    ble_name_patterns: Vec<String>,
    mac_prefixes: Vec<String>,
    service_fragments: Vec<String>,
}

/// On-disk rule file shape. Missing lists fall back to the defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RuleFile {
    wifi_name_patterns: Vec<String>,
    ble_name_patterns: Vec<String>,
    mac_prefixes: Vec<String>,
    service_fragments: Vec<String>,
}

impl Default for RuleFile {
    fn default() -> Self {
        Self {
            wifi_name_patterns: to_owned(defaults::WIFI_NAME_PATTERNS),
            ble_name_patterns: to_owned(defaults::BLE_NAME_PATTERNS),
            mac_prefixes: defaults::MAC_PREFIXES
                .iter()
                .map(|(prefix, _)| prefix.to_string())
                .collect(),
            service_fragments: to_owned(defaults::SERVICE_UUID_FRAGMENTS),
        }
    }
}

impl From<RuleFile> for ThreatRules {
    fn from(file: RuleFile) -> Self {
        ThreatRules::new(
            file.wifi_name_patterns,
            file.ble_name_patterns,
            file.mac_prefixes,
            file.service_fragments,
        )
    }
}

fn to_owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn normalize_patterns(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

impl ThreatRules {
    pub fn new(
        wifi_name_patterns: Vec<String>,
        ble_name_patterns: Vec<String>,
        mac_prefixes: Vec<String>,
        service_fragments: Vec<String>,
    ) -> Self {
        Self {
            wifi_name_patterns: normalize_patterns(wifi_name_patterns),
            ble_name_patterns: normalize_patterns(ble_name_patterns),
            mac_prefixes: mac_prefixes
                .iter()
                .map(|p| canonical_address(p))
                .filter(|p| !p.is_empty())
                .collect(),
            service_fragments: normalize_patterns(service_fragments),
        }
    }

    /// Parse a JSON rule file body.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON rule file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading rules from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// First WiFi pattern contained in `name` (case-insensitive).
    pub fn match_wifi_name(&self, name: &str) -> Option<&str> {
        find_contained(&self.wifi_name_patterns, name)
    }

    /// First BLE name pattern contained in `name` (case-insensitive).
    pub fn match_ble_name(&self, name: &str) -> Option<&str> {
        find_contained(&self.ble_name_patterns, name)
    }

    /// First prefix the canonical `address` starts with.
    pub fn match_mac_prefix(&self, address: &str) -> Option<&str> {
        self.mac_prefixes
            .iter()
            .find(|prefix| address.starts_with(prefix.as_str()))
            .map(String::as_str)
    }

    /// First fragment found in any of the (lower-cased) service identifiers.
    pub fn match_service<'a, I>(&self, identifiers: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a String> + Clone,
    {
        self.service_fragments
            .iter()
            .find(|fragment| {
                identifiers
                    .clone()
                    .into_iter()
                    .any(|id| id.to_lowercase().contains(fragment.as_str()))
            })
            .map(String::as_str)
    }

    /// Pattern counts, for the startup log line.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.wifi_name_patterns.len(),
            self.ble_name_patterns.len(),
            self.mac_prefixes.len(),
            self.service_fragments.len(),
        )
    }
}

impl Default for ThreatRules {
    fn default() -> Self {
        RuleFile::default().into()
    }
}

fn find_contained<'a>(patterns: &'a [String], haystack: &str) -> Option<&'a str> {
    if haystack.is_empty() {
        return None;
    }
    let lower = haystack.to_lowercase();
    patterns
        .iter()
        .find(|p| lower.contains(p.as_str()))
        .map(String::as_str)
}
