//! End-to-end scan flow: radio records in, live list and saved history out.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use wtf_scanner::clock::SystemClock;
use wtf_scanner::comm::{self, LineReader};
use wtf_scanner::config::ScannerConfig;
use wtf_scanner::coordinator::ScanState;
use wtf_scanner::protocol::Inbound;
use wtf_scanner::radio::{FeedRadio, StaticPermissions};
use wtf_scanner::session::{Radios, ScanSession};
use wtf_scanner::sqlite::SqliteStore;

fn open_session(db: &std::path::Path, radio: &Arc<FeedRadio>) -> ScanSession {
    let store = Arc::new(SqliteStore::open(db).unwrap());
    ScanSession::new(
        ScannerConfig {
            rescan_interval_ms: 60_000,
            ..ScannerConfig::default()
        },
        Radios {
            wifi: radio.clone(),
            ble: radio.clone(),
            permissions: Arc::new(StaticPermissions::granted()),
        },
        store.clone(),
        store,
        Arc::new(SystemClock),
    )
    .unwrap()
}

/// Feed NDJSON text through the same path the daemon uses.
fn feed_ndjson(session: &ScanSession, radio: &FeedRadio, text: &str) {
    let started = std::time::Instant::now();
    let mut reader = LineReader::new();
    for &byte in text.as_bytes() {
        if let Some(line) = reader.feed(byte) {
            match comm::parse_inbound(line).unwrap() {
                Inbound::Command(cmd) => {
                    comm::handle_command(session, cmd, started);
                }
                Inbound::Feed(feed) => comm::handle_feed(radio, feed).unwrap(),
            }
        }
    }
}

#[test]
fn ndjson_session_saves_and_restores_history() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("wtf.db");
    let radio = Arc::new(FeedRadio::new());

    {
        let session = open_session(&db, &radio);
        feed_ndjson(
            &session,
            &radio,
            concat!(
                "{\"cmd\":\"start\"}\n",
                "{\"cmd\":\"set_location\",\"lat\":45.52,\"lng\":-122.68}\n",
                "{\"cmd\":\"set_auto_persist\",\"enabled\":true}\n",
                "{\"type\":\"wifi_results\",\"results\":[",
                "{\"ssid\":\"Flock-Cam-12\",\"bssid\":\"58:8e:81:aa:bb:cc\",\"level\":-80},",
                "{\"ssid\":\"HomeWifi\",\"bssid\":\"AA:BB:CC:DD:EE:FF\",\"level\":-40},",
                "{\"ssid\":\"\",\"bssid\":\"EC:1B:BD:00:00:01\",\"level\":-75}]}\n",
                "{\"type\":\"ble_adv\",\"address\":\"11:22:33:44:55:66\",\"advertised_name\":null,",
                "\"device_name\":\"restricted\",",
                "\"service_uuids\":[\"0000180A-0000-1000-8000-00805F9B34FB\"],\"rssi\":-90}\n",
                "{\"type\":\"wifi_results\",\"results\":[",
                "{\"ssid\":\"Flock-Cam-12\",\"bssid\":\"58:8E:81:AA:BB:CC\",\"level\":-60}]}\n",
                "{\"type\":\"ble_failed\",\"code\":2}\n",
            ),
        );
        assert_eq!(session.state(), ScanState::Scanning);

        let live = session.current();
        let addresses: Vec<&str> = live.iter().map(|d| d.hardware_address.as_str()).collect();
        assert_eq!(
            addresses,
            ["58:8E:81:AA:BB:CC", "11:22:33:44:55:66", "EC:1B:BD:00:00:01"]
        );
        assert_eq!(live[0].threat_level, 3);
        assert_eq!(live[1].reason.as_deref(), Some("Service UUID"));
        // Hidden SSID on a known prefix: MAC-only match
        assert_eq!(live[2].display_name.as_deref(), Some("Hidden Network"));
        assert_eq!(live[2].threat_level, 2);
        assert_eq!(live[0].latitude, 45.52);

        session.shutdown();
        let saved = session.saved().unwrap();
        assert_eq!(saved.len(), 3);
        let flock = saved
            .iter()
            .find(|d| d.hardware_address == "58:8E:81:AA:BB:CC")
            .unwrap();
        assert_eq!(flock.signal_strength, -60);
        assert!(saved.iter().all(|d| d.hardware_address != "AA:BB:CC:DD:EE:FF"));
    }

    // Reopen: history and the automatic persistence preference survive
    let session = open_session(&db, &radio);
    assert!(session.auto_persist());
    assert_eq!(session.saved().unwrap().len(), 3);
    assert!(session.current().is_empty());

    feed_ndjson(&session, &radio, "{\"cmd\":\"clear_saved\"}\n");
    assert!(session.saved().unwrap().is_empty());
}

#[test]
fn permission_denied_keeps_session_idle() {
    let dir = tempfile::tempdir().unwrap();
    let radio = Arc::new(FeedRadio::new());
    let store = Arc::new(SqliteStore::open(dir.path().join("wtf.db")).unwrap());
    let session = ScanSession::new(
        ScannerConfig::default(),
        Radios {
            wifi: radio.clone(),
            ble: radio.clone(),
            permissions: Arc::new(StaticPermissions::new(false, true)),
        },
        store.clone(),
        store,
        Arc::new(SystemClock),
    )
    .unwrap();

    assert!(session.start().is_err());
    assert_eq!(session.state(), ScanState::Idle);
    assert!(!radio.has_wifi_listener());
    assert!(!radio.ble_running());
}
