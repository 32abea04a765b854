//! Scan fusion engine.
//!
//! Owns the live location and the live detection set. Radio callbacks on any
//! thread hand it observations; it classifies them, upserts matches by
//! hardware address and publishes an immutable snapshot per transition.

use std::sync::{mpsc, Arc};

use crate::clock::Clock;
use crate::detection::{Detection, DetectionList, Location};
use crate::filter::{classify, Classification};
use crate::observable::Observable;
use crate::observation::{canonical_address, Observation};
use crate::rules::ThreatRules;

pub struct ScanEngine {
    rules: ThreatRules,
    clock: Arc<dyn Clock>,
    location: Observable<Option<Location>>,
    detections: Observable<DetectionList>,
}

impl ScanEngine {
    pub fn new(rules: ThreatRules, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            clock,
            location: Observable::new(None),
            detections: Observable::new(Arc::new(Vec::new())),
        }
    }

    pub fn rules(&self) -> &ThreatRules {
        &self.rules
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Location ────────────────────────────────────────────────────

    /// Only detections created after this call are tagged with the new fix.
    pub fn set_location(&self, latitude: f64, longitude: f64) {
        log::debug!("Location update: {latitude:.6}, {longitude:.6}");
        self.location.set(Some(Location::new(latitude, longitude)));
    }

    /// Last known fix, `None` until the first update.
    pub fn location(&self) -> Option<Location> {
        self.location.get()
    }

    pub fn subscribe_location(&self) -> mpsc::Receiver<Option<Location>> {
        self.location.subscribe()
    }

    // ── Ingest ──────────────────────────────────────────────────────

    /// Classify once; build the tagged detection when it matched.
    fn detect(&self, observation: Observation) -> (Classification, Option<Detection>) {
        let classification = classify(&observation, &self.rules);
        if !classification.is_match() {
            return (classification, None);
        }
        let location = self.location().unwrap_or(Location::UNKNOWN);
        let detection =
            Detection::from_observation(observation, &classification, location, self.clock.now());
        log::debug!(
            "Match {} level={} ({})",
            detection.hardware_address,
            detection.threat_level,
            classification.reason.unwrap_or_default()
        );
        (classification, Some(detection))
    }

    /// Classify one observation and upsert it when it matches.
    pub fn ingest(&self, observation: Observation) -> Classification {
        let (classification, detection) = self.detect(observation);
        if let Some(detection) = detection {
            self.detections.update(|list| {
                let mut next = Vec::with_capacity(list.len() + 1);
                upsert(&mut next, list, detection);
                *list = Arc::new(next);
                true
            });
        }
        classification
    }

    /// Ingest a whole scan batch as one transition. Returns how many
    /// observations matched; nothing is published when none did.
    pub fn ingest_batch<I>(&self, observations: I) -> usize
    where
        I: IntoIterator<Item = Observation>,
    {
        let matched: Vec<Detection> = observations
            .into_iter()
            .filter_map(|o| self.detect(o).1)
            .collect();
        if matched.is_empty() {
            return 0;
        }

        let count = matched.len();
        self.detections.update(|list| {
            let mut current: Vec<Detection> = list.as_ref().clone();
            for detection in matched {
                let mut next = Vec::with_capacity(current.len() + 1);
                upsert(&mut next, &current, detection);
                current = next;
            }
            *list = Arc::new(current);
            true
        });
        log::debug!("Batch ingest: {count} match(es)");
        count
    }

    // ── Live set ────────────────────────────────────────────────────

    pub fn current(&self) -> DetectionList {
        self.detections.get()
    }

    /// Live set subscription: current snapshot first, then every transition.
    pub fn subscribe(&self) -> mpsc::Receiver<DetectionList> {
        self.detections.subscribe()
    }

    /// Callback form of [`ScanEngine::subscribe`]. Runs under the live-set
    /// lock; return `false` to unsubscribe.
    pub fn subscribe_with<F>(&self, sink: F)
    where
        F: Fn(&DetectionList) -> bool + Send + 'static,
    {
        self.detections.subscribe_with(sink);
    }

    pub fn clear(&self) {
        self.detections.set(Arc::new(Vec::new()));
    }

    /// Drop the live entry for `address`. Returns whether one existed.
    pub fn remove(&self, address: &str) -> bool {
        let address = canonical_address(address);
        self.detections.update(|list| {
            if !list.iter().any(|d| d.hardware_address == address) {
                return false;
            }
            let next: Vec<Detection> = list
                .iter()
                .filter(|d| d.hardware_address != address)
                .cloned()
                .collect();
            *list = Arc::new(next);
            true
        })
    }
}

/// `next` = `detection` followed by `current` minus any entry with the same
/// address.
fn upsert(next: &mut Vec<Detection>, current: &[Detection], detection: Detection) {
    let address = detection.hardware_address.clone();
    next.push(detection);
    next.extend(
        current
            .iter()
            .filter(|d| d.hardware_address != address)
            .cloned(),
    );
}
