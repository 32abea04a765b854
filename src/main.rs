//! wtf-scanner: Linux host daemon.
//!
//! Reads NDJSON from stdin (host commands and radio feed records from the
//! platform radio adapter) and writes NDJSON device messages to stdout.
//! Logs go to stderr through `env_logger` (`RUST_LOG`, default `info`).
//!
//! Usage: `wtf-scanner [config.json]`

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use wtf_scanner::clock::SystemClock;
use wtf_scanner::comm::{self, LineReader};
use wtf_scanner::config::ScannerConfig;
use wtf_scanner::detection::{DetectionList, ScanSummary};
use wtf_scanner::protocol::{DeviceMessage, Inbound, VERSION};
use wtf_scanner::radio::{FeedRadio, StaticPermissions};
use wtf_scanner::session::{Radios, ScanSession};
use wtf_scanner::store::{DetectionStore, MemoryStore, SettingsStore};

/// Interval between unsolicited status messages.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// How often the notify thread checks for shutdown while idle.
const NOTIFY_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let started = Instant::now();
    log::info!("wtf-scanner v{VERSION} starting");

    // ── Configuration ────────────────────────────────────────────────

    let mut config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => ScannerConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScannerConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;

    // ── Storage ──────────────────────────────────────────────────────

    let (store, settings) = open_store(&config)?;

    // ── Session ──────────────────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::channel::<String>();

    // Scan triggers and radio attach changes go to the adapter on stdout
    let radio = Arc::new(FeedRadio::new());
    let control_tx = Mutex::new(output_tx.clone());
    radio.set_control_sink(Arc::new(move |request| {
        send(&control_tx.lock(), &comm::control_message(request));
    }));

    let session = Arc::new(ScanSession::new(
        config,
        Radios {
            wifi: radio.clone(),
            ble: radio.clone(),
            permissions: Arc::new(StaticPermissions::granted()),
        },
        store,
        settings,
        Arc::new(SystemClock),
    )?);

    // ── Output thread ────────────────────────────────────────────────

    let output = thread::Builder::new()
        .name("output".into())
        .spawn(move || output_thread(output_rx))?;

    // ── Notify thread ────────────────────────────────────────────────

    let detections_rx = session.subscribe_detections();
    let notify_tx = output_tx.clone();
    let stopping = Arc::new(AtomicBool::new(false));
    let notify_stopping = Arc::clone(&stopping);
    let notify = thread::Builder::new()
        .name("notify".into())
        .spawn(move || notify_thread(detections_rx, notify_tx, notify_stopping))?;

    // ── Status thread ────────────────────────────────────────────────

    let status_session = Arc::clone(&session);
    let status_tx = output_tx.clone();
    thread::Builder::new()
        .name("status".into())
        .spawn(move || status_thread(status_session, status_tx, started))?;

    if let Err(e) = session.start() {
        log::error!("Initial scan start refused: {e}");
    }

    // ── Input loop (main thread) ─────────────────────────────────────

    input_loop(&session, &radio, &output_tx, started)?;

    log::info!("stdin closed, shutting down");
    session.shutdown();
    // Let the notify thread drain the last snapshots before output closes
    stopping.store(true, Ordering::Relaxed);
    let _ = notify.join();
    // Empty line tells the output thread to stop once queued lines are out
    let _ = output_tx.send(String::new());
    let _ = output.join();
    Ok(())
}

fn open_store(
    config: &ScannerConfig,
) -> anyhow::Result<(Arc<dyn DetectionStore>, Arc<dyn SettingsStore>)> {
    match &config.database_path {
        #[cfg(feature = "sqlite")]
        Some(path) => {
            let store = Arc::new(
                wtf_scanner::sqlite::SqliteStore::open(path)
                    .with_context(|| format!("opening database {}", path.display()))?,
            );
            let detections: Arc<dyn DetectionStore> = store.clone();
            let settings: Arc<dyn SettingsStore> = store;
            Ok((detections, settings))
        }
        #[cfg(not(feature = "sqlite"))]
        Some(path) => {
            log::warn!(
                "Built without sqlite; ignoring database {} and keeping history in memory",
                path.display()
            );
            Ok(memory_store())
        }
        None => {
            log::info!("No database configured; saved history is kept in memory");
            Ok(memory_store())
        }
    }
}

fn memory_store() -> (Arc<dyn DetectionStore>, Arc<dyn SettingsStore>) {
    let store = Arc::new(MemoryStore::new());
    let detections: Arc<dyn DetectionStore> = store.clone();
    let settings: Arc<dyn SettingsStore> = store;
    (detections, settings)
}

fn send(tx: &Sender<String>, msg: &DeviceMessage) {
    if let Some(line) = comm::serialize_message(msg) {
        let _ = tx.send(line);
    }
}

// ── Input loop ───────────────────────────────────────────────────────

fn input_loop(
    session: &ScanSession,
    radio: &FeedRadio,
    output_tx: &Sender<String>,
    started: Instant,
) -> io::Result<()> {
    let mut reader = LineReader::new();
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 1024];

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &buf[..n] {
            let Some(line) = reader.feed(byte) else {
                continue;
            };
            match comm::parse_inbound(line) {
                Ok(Inbound::Command(cmd)) => {
                    log::debug!("Command: {cmd:?}");
                    if let Some(reply) = comm::handle_command(session, cmd, started) {
                        send(output_tx, &reply);
                    }
                }
                Ok(Inbound::Feed(feed)) => {
                    if let Err(e) = comm::handle_feed(radio, feed) {
                        log::warn!("Rejected feed record: {e}");
                        send(output_tx, &DeviceMessage::error(e));
                    }
                }
                Err(e) => {
                    log::warn!("Unparseable input line: {e}");
                    send(output_tx, &DeviceMessage::error(format!("unparseable line: {e}")));
                }
            }
        }
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: Receiver<String>) {
    log::debug!("Output thread started");
    let stdout = io::stdout();
    while let Ok(line) = output_rx.recv() {
        if line.is_empty() {
            break;
        }
        let mut out = stdout.lock();
        if out.write_all(line.as_bytes()).and_then(|_| out.flush()).is_err() {
            log::error!("stdout closed");
            break;
        }
    }
}

// ── Notify thread ────────────────────────────────────────────────────

/// Emits a detection message for every added or refreshed live entry, and
/// an alert when the live list grows. Exits once `stopping` is set and no
/// snapshot is pending.
fn notify_thread(
    detections_rx: Receiver<DetectionList>,
    output_tx: Sender<String>,
    stopping: Arc<AtomicBool>,
) {
    let mut seen: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    let mut previous = ScanSummary::from_detections(&[]);

    loop {
        let list = match detections_rx.recv_timeout(NOTIFY_POLL) {
            Ok(list) => list,
            Err(RecvTimeoutError::Timeout) if stopping.load(Ordering::Relaxed) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        for detection in list.iter() {
            if seen.get(&detection.hardware_address) == Some(&detection.timestamp) {
                continue;
            }
            send(&output_tx, &DeviceMessage::detection(detection));
        }
        seen = list
            .iter()
            .map(|d| (d.hardware_address.clone(), d.timestamp))
            .collect();

        let summary = ScanSummary::from_detections(&list);
        if summary.is_new_target_since(&previous) {
            log::info!(
                "New target ({} total): {}",
                summary.count,
                summary.last_target.as_deref().unwrap_or("?")
            );
            send(
                &output_tx,
                &DeviceMessage::Alert {
                    count: summary.count,
                    last_target: summary.last_target.as_deref(),
                },
            );
        }
        previous = summary;
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(session: Arc<ScanSession>, output_tx: Sender<String>, started: Instant) {
    loop {
        thread::sleep(STATUS_INTERVAL);
        let msg = comm::status_message(&session, started);
        if let Some(line) = comm::serialize_message(&msg) {
            if output_tx.send(line).is_err() {
                break;
            }
        }
    }
}
