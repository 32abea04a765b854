//! Durable detection store interface and the in-memory implementation.
//!
//! The store keeps at most one record per hardware address. Writes go
//! through [`DetectionStore::insert_or_replace`], which behaves like SQL
//! `INSERT OR REPLACE`: any row sharing the id or the address is replaced.
//! Whether a write should happen at all is decided by [`crate::merge`].

use std::sync::{mpsc, Arc};

use parking_lot::Mutex;
use serde_json::Value;

use crate::detection::{Detection, DetectionList};
use crate::error::StoreResult;
use crate::observable::Observable;

/// Setting key for the automatic persistence preference.
pub const AUTO_PERSIST_KEY: &str = "auto_persist";

pub trait DetectionStore: Send + Sync {
    /// Write `detection`, replacing any record with the same id or address.
    /// Returns the id of the written record.
    fn insert_or_replace(&self, detection: &Detection) -> StoreResult<i64>;

    fn delete_all(&self) -> StoreResult<()>;

    /// Delete by storage identity. Returns whether a record was removed;
    /// a detection without an id removes nothing.
    fn delete(&self, detection: &Detection) -> StoreResult<bool>;

    fn find_by_address(&self, address: &str) -> StoreResult<Option<Detection>>;

    /// All records, newest timestamp first.
    fn all_newest_first(&self) -> StoreResult<Vec<Detection>>;

    /// Saved records stream: current contents first, then after every write.
    fn subscribe(&self) -> mpsc::Receiver<DetectionList>;
}

/// JSON-valued key/value preferences.
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, key: &str) -> StoreResult<Option<Value>>;
    fn set_setting(&self, key: &str, value: &Value) -> StoreResult<()>;
}

/// Read a boolean setting, `None` when unset or not a boolean.
pub fn get_bool_setting(settings: &dyn SettingsStore, key: &str) -> StoreResult<Option<bool>> {
    Ok(settings.get_setting(key)?.and_then(|v| v.as_bool()))
}

pub(crate) fn sort_newest_first(records: &mut [Detection]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

// ── In-memory store ─────────────────────────────────────────────────

struct MemoryInner {
    records: Vec<Detection>,
    next_id: i64,
    settings: Vec<(String, Value)>,
}

/// Volatile store for tests and for running without a database path.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    saved: Observable<DetectionList>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                records: Vec::new(),
                next_id: 1,
                settings: Vec::new(),
            }),
            saved: Observable::new(Arc::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, inner: &MemoryInner) {
        let mut all = inner.records.clone();
        sort_newest_first(&mut all);
        self.saved.set(Arc::new(all));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionStore for MemoryStore {
    fn insert_or_replace(&self, detection: &Detection) -> StoreResult<i64> {
        let mut inner = self.inner.lock();
        let id = match detection.id {
            Some(id) => id,
            None => inner.next_id,
        };
        inner.next_id = inner.next_id.max(id + 1);
        inner
            .records
            .retain(|d| d.id != Some(id) && d.hardware_address != detection.hardware_address);
        let mut stored = detection.clone();
        stored.id = Some(id);
        inner.records.push(stored);
        self.publish(&inner);
        Ok(id)
    }

    fn delete_all(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.records.clear();
        self.publish(&inner);
        Ok(())
    }

    fn delete(&self, detection: &Detection) -> StoreResult<bool> {
        let Some(id) = detection.id else {
            return Ok(false);
        };
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|d| d.id != Some(id));
        let removed = inner.records.len() != before;
        if removed {
            self.publish(&inner);
        }
        Ok(removed)
    }

    fn find_by_address(&self, address: &str) -> StoreResult<Option<Detection>> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .find(|d| d.hardware_address == address)
            .cloned())
    }

    fn all_newest_first(&self) -> StoreResult<Vec<Detection>> {
        let mut all = self.inner.lock().records.clone();
        sort_newest_first(&mut all);
        Ok(all)
    }

    fn subscribe(&self) -> mpsc::Receiver<DetectionList> {
        self.saved.subscribe()
    }
}

impl SettingsStore for MemoryStore {
    fn get_setting(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .inner
            .lock()
            .settings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    fn set_setting(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.settings.retain(|(k, _)| k != key);
        inner.settings.push((key.to_string(), value.clone()));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::observation::RadioKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    pub fn detection(address: &str, rssi: i32, offset_secs: i64) -> Detection {
        let at = base_time() + Duration::seconds(offset_secs);
        Detection {
            id: None,
            kind: RadioKind::BluetoothLe,
            hardware_address: address.into(),
            display_name: Some("Penguin-7".into()),
            service_identifiers: ["00003100-0000-1000-8000-00805f9b34fb".to_string()]
                .into_iter()
                .collect::<BTreeSet<_>>(),
            signal_strength: rssi,
            observed_at: at,
            latitude: 45.512_345,
            longitude: -122.658_765,
            threat_level: 3,
            reason: Some("Service UUID".into()),
            timestamp: at,
        }
    }
}
