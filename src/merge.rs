//! Merge policy for durable writes.
//!
//! A candidate detection is written when the store has no record for its
//! address, or when the active policy says it beats the stored one. A
//! replacing write keeps the stored record's id.

use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::StoreResult;
use crate::store::DetectionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Overwrite only with a strictly stronger signal.
    #[default]
    KeepStrongest,
    /// Every sighting overwrites.
    LatestWins,
}

impl MergePolicy {
    pub fn should_replace(&self, existing: &Detection, candidate: &Detection) -> bool {
        match self {
            MergePolicy::KeepStrongest => candidate.signal_strength > existing.signal_strength,
            MergePolicy::LatestWins => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted(i64),
    Replaced(i64),
    Discarded,
}

/// Counts from a [`persist_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub inserted: usize,
    pub replaced: usize,
    pub discarded: usize,
    /// Candidates whose store lookup or write failed.
    pub failed: usize,
}

impl PersistReport {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted(_) => self.inserted += 1,
            MergeOutcome::Replaced(_) => self.replaced += 1,
            MergeOutcome::Discarded => self.discarded += 1,
        }
    }

    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Apply `policy` to one candidate against the store.
pub fn persist(
    store: &dyn DetectionStore,
    policy: MergePolicy,
    candidate: &Detection,
) -> StoreResult<MergeOutcome> {
    match store.find_by_address(&candidate.hardware_address)? {
        None => {
            let mut fresh = candidate.clone();
            fresh.id = None;
            Ok(MergeOutcome::Inserted(store.insert_or_replace(&fresh)?))
        }
        Some(existing) if policy.should_replace(&existing, candidate) => {
            let mut merged = candidate.clone();
            merged.id = existing.id;
            Ok(MergeOutcome::Replaced(store.insert_or_replace(&merged)?))
        }
        Some(_) => Ok(MergeOutcome::Discarded),
    }
}

/// Apply `policy` to every detection in a snapshot. A store error is logged
/// and counted, and the remaining candidates are still written.
pub fn persist_all(
    store: &dyn DetectionStore,
    policy: MergePolicy,
    detections: &[Detection],
) -> PersistReport {
    let mut report = PersistReport::default();
    for detection in detections {
        match persist(store, policy, detection) {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                log::error!("Persist {} failed: {e}", detection.hardware_address);
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::test_support::detection;
    use crate::store::MemoryStore;

    #[test]
    fn first_sighting_is_inserted() {
        let store = MemoryStore::new();
        let candidate = detection("AA", -80, 0);
        let outcome = persist(&store, MergePolicy::KeepStrongest, &candidate).unwrap();
        assert!(matches!(outcome, MergeOutcome::Inserted(_)));
    }

    #[test]
    fn stronger_signal_overwrites_and_keeps_id() {
        let store = MemoryStore::new();
        let MergeOutcome::Inserted(id) =
            persist(&store, MergePolicy::KeepStrongest, &detection("AA", -80, 0)).unwrap()
        else {
            panic!("expected insert");
        };
        let candidate = detection("AA", -60, 1);
        let outcome = persist(&store, MergePolicy::KeepStrongest, &candidate).unwrap();
        assert_eq!(outcome, MergeOutcome::Replaced(id));
        let stored = store.find_by_address("AA").unwrap().unwrap();
        assert_eq!(stored.signal_strength, -60);
        assert_eq!(stored.id, Some(id));
    }

    #[test]
    fn weaker_or_equal_signal_is_discarded() {
        let store = MemoryStore::new();
        persist(&store, MergePolicy::KeepStrongest, &detection("AA", -80, 0)).unwrap();
        assert_eq!(
            persist(&store, MergePolicy::KeepStrongest, &detection("AA", -90, 1)).unwrap(),
            MergeOutcome::Discarded
        );
        assert_eq!(
            persist(&store, MergePolicy::KeepStrongest, &detection("AA", -80, 2)).unwrap(),
            MergeOutcome::Discarded
        );
        assert_eq!(store.find_by_address("AA").unwrap().unwrap().signal_strength, -80);
    }

    #[test]
    fn latest_wins_always_writes() {
        let store = MemoryStore::new();
        persist(&store, MergePolicy::LatestWins, &detection("AA", -60, 0)).unwrap();
        let outcome = persist(&store, MergePolicy::LatestWins, &detection("AA", -90, 1)).unwrap();
        assert!(matches!(outcome, MergeOutcome::Replaced(_)));
        assert_eq!(store.find_by_address("AA").unwrap().unwrap().signal_strength, -90);
    }

    #[test]
    fn persist_all_reports_counts() {
        let store = MemoryStore::new();
        persist(&store, MergePolicy::KeepStrongest, &detection("AA", -70, 0)).unwrap();
        let report = persist_all(
            &store,
            MergePolicy::KeepStrongest,
            &[
                detection("AA", -50, 1),
                detection("BB", -70, 1),
                detection("CC", -70, 1),
            ],
        );
        assert_eq!(
            report,
            PersistReport {
                inserted: 2,
                replaced: 1,
                discarded: 0,
                failed: 0,
            }
        );
        assert_eq!(report.written(), 3);
    }

    /// Fails every write for one address.
    struct FailingFor {
        inner: MemoryStore,
        address: &'static str,
    }

    impl DetectionStore for FailingFor {
        fn insert_or_replace(&self, detection: &Detection) -> StoreResult<i64> {
            if detection.hardware_address == self.address {
                return Err(StoreError::Decode("disk full".into()));
            }
            self.inner.insert_or_replace(detection)
        }

        fn delete_all(&self) -> StoreResult<()> {
            self.inner.delete_all()
        }

        fn delete(&self, detection: &Detection) -> StoreResult<bool> {
            self.inner.delete(detection)
        }

        fn find_by_address(&self, address: &str) -> StoreResult<Option<Detection>> {
            self.inner.find_by_address(address)
        }

        fn all_newest_first(&self) -> StoreResult<Vec<Detection>> {
            self.inner.all_newest_first()
        }

        fn subscribe(&self) -> std::sync::mpsc::Receiver<crate::detection::DetectionList> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn persist_all_continues_after_store_error() {
        let store = FailingFor {
            inner: MemoryStore::new(),
            address: "BB",
        };
        let report = persist_all(
            &store,
            MergePolicy::KeepStrongest,
            &[
                detection("AA", -70, 0),
                detection("BB", -70, 0),
                detection("CC", -70, 0),
            ],
        );
        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert!(store.inner.find_by_address("CC").unwrap().is_some());
        assert!(store.inner.find_by_address("BB").unwrap().is_none());
    }

    #[test]
    fn policy_deserializes_snake_case() {
        let p: MergePolicy = serde_json::from_str(r#""latest_wins""#).unwrap();
        assert_eq!(p, MergePolicy::LatestWins);
        assert_eq!(MergePolicy::default(), MergePolicy::KeepStrongest);
    }
}
