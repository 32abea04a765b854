//! Persistence worker.
//!
//! Runs the merge policy against the durable store on its own thread so a
//! slow or failing write never holds up the live path. In automatic mode
//! every live-set snapshot is queued; snapshots that pile up while a write is
//! in progress are coalesced into the best candidate per address before the
//! next pass.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::Value;

use crate::detection::{Detection, DetectionList};
use crate::merge::{persist_all, MergePolicy, PersistReport};
use crate::store::{get_bool_setting, DetectionStore, SettingsStore, AUTO_PERSIST_KEY};

enum Job {
    /// Live-set transition seen while automatic mode is on.
    Snapshot(DetectionList),
    /// Explicit one-shot pass.
    PersistNow(DetectionList),
    /// Reply once every earlier job is done.
    Flush(mpsc::Sender<()>),
    Shutdown,
}

pub struct Persister {
    tx: mpsc::Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
    auto: Arc<AtomicBool>,
    settings: Arc<dyn SettingsStore>,
    policy: MergePolicy,
}

impl Persister {
    /// Start the worker. The automatic-mode flag is read from `settings`,
    /// falling back to `default_auto` when it was never stored.
    pub fn spawn(
        store: Arc<dyn DetectionStore>,
        settings: Arc<dyn SettingsStore>,
        policy: MergePolicy,
        default_auto: bool,
    ) -> io::Result<Self> {
        let auto = match get_bool_setting(settings.as_ref(), AUTO_PERSIST_KEY) {
            Ok(stored) => stored.unwrap_or(default_auto),
            Err(e) => {
                log::error!("Failed to read {AUTO_PERSIST_KEY} setting: {e}");
                default_auto
            }
        };

        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("persist".into())
            .spawn(move || persist_thread(rx, store, policy))?;
        log::info!("Persistence worker spawned (policy={policy:?}, auto={auto})");

        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
            auto: Arc::new(AtomicBool::new(auto)),
            settings,
            policy,
        })
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn auto_persist(&self) -> bool {
        self.auto.load(Ordering::Relaxed)
    }

    /// Switch automatic mode. Enabling it saves `current` right away. The
    /// flag is written to the settings store so it survives restarts.
    pub fn set_auto_persist(&self, enabled: bool, current: DetectionList) {
        self.auto.store(enabled, Ordering::Relaxed);
        if let Err(e) = self.settings.set_setting(AUTO_PERSIST_KEY, &Value::Bool(enabled)) {
            log::error!("Failed to store {AUTO_PERSIST_KEY} setting: {e}");
        }
        log::info!("Automatic persistence {}", if enabled { "enabled" } else { "disabled" });
        if enabled {
            self.persist_now(current);
        }
    }

    /// Queue one merge pass over `snapshot`.
    pub fn persist_now(&self, snapshot: DetectionList) {
        self.send(Job::PersistNow(snapshot));
    }

    /// Live-set sink for [`crate::engine::ScanEngine::subscribe_with`]:
    /// queues each snapshot while automatic mode is on. Unsubscribes once
    /// the worker is gone.
    pub fn snapshot_sink(&self) -> impl Fn(&DetectionList) -> bool + Send + 'static {
        let tx = self.tx.clone();
        let auto = Arc::clone(&self.auto);
        move |list: &DetectionList| {
            if !auto.load(Ordering::Relaxed) || list.is_empty() {
                return true;
            }
            tx.send(Job::Snapshot(Arc::clone(list))).is_ok()
        }
    }

    /// Block until every job queued so far has been handled.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Finish queued work and join the worker. Safe to call more than once.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.tx.send(Job::Shutdown);
        if worker.join().is_err() {
            log::error!("Persistence worker panicked");
        }
    }

    fn send(&self, job: Job) {
        if self.tx.send(job).is_err() {
            log::warn!("Persistence worker stopped; job dropped");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best pending candidate per address under one policy.
struct Coalesced {
    policy: MergePolicy,
    best: BTreeMap<String, Detection>,
}

impl Coalesced {
    fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            best: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, snapshot: &[Detection]) {
        for candidate in snapshot {
            match self.best.get(&candidate.hardware_address) {
                Some(held) if !self.policy.should_replace(held, candidate) => {}
                _ => {
                    self.best
                        .insert(candidate.hardware_address.clone(), candidate.clone());
                }
            }
        }
    }

    fn into_candidates(self) -> Vec<Detection> {
        self.best.into_values().collect()
    }
}

fn persist_thread(rx: mpsc::Receiver<Job>, store: Arc<dyn DetectionStore>, policy: MergePolicy) {
    log::debug!("Persistence worker started");
    let mut pending: Option<Job> = None;

    loop {
        let job = match pending.take() {
            Some(job) => job,
            None => match rx.recv() {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        match job {
            Job::Snapshot(list) => {
                let mut coalesced = Coalesced::new(policy);
                coalesced.absorb(&list);
                let mut merged = 1;
                loop {
                    match rx.try_recv() {
                        Ok(Job::Snapshot(next)) => {
                            coalesced.absorb(&next);
                            merged += 1;
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                if merged > 1 {
                    log::debug!("Coalesced {merged} snapshots");
                }
                run_pass(store.as_ref(), policy, &coalesced.into_candidates(), "auto");
            }
            Job::PersistNow(list) => run_pass(store.as_ref(), policy, &list, "manual"),
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Shutdown => break,
        }
    }
    log::debug!("Persistence worker stopped");
}

fn run_pass(
    store: &dyn DetectionStore,
    policy: MergePolicy,
    candidates: &[Detection],
    mode: &str,
) {
    let PersistReport {
        inserted,
        replaced,
        discarded,
        failed,
    } = persist_all(store, policy, candidates);
    if failed > 0 {
        log::warn!("Persist ({mode}): {failed} of {} candidate(s) failed", candidates.len());
    }
    log::debug!(
        "Persist ({mode}): {inserted} inserted, {replaced} replaced, {discarded} discarded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::detection;
    use crate::store::MemoryStore;

    fn setup(default_auto: bool) -> (Arc<MemoryStore>, Persister) {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::spawn(
            store.clone(),
            store.clone(),
            MergePolicy::KeepStrongest,
            default_auto,
        )
        .unwrap();
        (store, persister)
    }

    #[test]
    fn manual_mode_ignores_snapshots() {
        let (store, persister) = setup(false);
        let sink = persister.snapshot_sink();
        assert!(sink(&Arc::new(vec![detection("AA", -60, 0)])));
        persister.flush();
        assert!(store.is_empty());
    }

    #[test]
    fn persist_now_runs_one_pass() {
        let (store, persister) = setup(false);
        persister.persist_now(Arc::new(vec![detection("AA", -60, 0), detection("BB", -70, 0)]));
        persister.flush();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn enabling_auto_saves_current_and_stores_flag() {
        let (store, persister) = setup(false);
        persister.set_auto_persist(true, Arc::new(vec![detection("AA", -60, 0)]));
        persister.flush();
        assert!(persister.auto_persist());
        assert_eq!(store.len(), 1);
        assert_eq!(get_bool_setting(store.as_ref(), AUTO_PERSIST_KEY).unwrap(), Some(true));
    }

    #[test]
    fn stored_flag_wins_over_default() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_setting(AUTO_PERSIST_KEY, &Value::Bool(true))
            .unwrap();
        let persister =
            Persister::spawn(store.clone(), store.clone(), MergePolicy::default(), false).unwrap();
        assert!(persister.auto_persist());
    }

    #[test]
    fn auto_snapshots_keep_strongest_reading() {
        let (store, persister) = setup(true);
        let sink = persister.snapshot_sink();
        for rssi in [-80, -55, -90, -70] {
            sink(&Arc::new(vec![detection("AA", rssi, 0)]));
        }
        persister.flush();
        assert_eq!(store.find_by_address("AA").unwrap().unwrap().signal_strength, -55);
    }

    #[test]
    fn coalescing_respects_policy() {
        let mut strongest = Coalesced::new(MergePolicy::KeepStrongest);
        strongest.absorb(&[detection("AA", -80, 0)]);
        strongest.absorb(&[detection("AA", -50, 1)]);
        strongest.absorb(&[detection("AA", -90, 2)]);
        assert_eq!(strongest.into_candidates()[0].signal_strength, -50);

        let mut latest = Coalesced::new(MergePolicy::LatestWins);
        latest.absorb(&[detection("AA", -50, 0)]);
        latest.absorb(&[detection("AA", -90, 1)]);
        assert_eq!(latest.into_candidates()[0].signal_strength, -90);
    }

    #[test]
    fn shutdown_finishes_queued_work() {
        let (store, persister) = setup(false);
        persister.persist_now(Arc::new(vec![detection("AA", -60, 0)]));
        persister.shutdown();
        persister.shutdown();
        assert_eq!(store.len(), 1);
    }
}
