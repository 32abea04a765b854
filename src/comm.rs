/// Host transport: NDJSON line framing, inbound parsing, outbound
/// serialization and dispatch of host commands and radio feed records.
use std::time::Instant;

use heapless::Vec as BoundedVec;

use crate::protocol::{DeviceMessage, HostCommand, Inbound, RadioFeed, MAX_LINE_LEN, VERSION};
use crate::radio::{BleEvent, FeedRadio, RadioControl};
use crate::scanner::BleAdvParser;
use crate::session::ScanSession;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage as one NDJSON line (trailing newline included).
/// Returns None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(mut line) => {
            line.push('\n');
            Some(line)
        }
        Err(e) => {
            log::error!("Failed to serialize message: {e}");
            None
        }
    }
}

/// Deserialize one inbound line.
pub fn parse_inbound(data: &[u8]) -> Result<Inbound, serde_json::Error> {
    serde_json::from_slice(data.trim_ascii())
}

// ── Dispatch ───────────────────────────────────────────────────────────

/// Process a host command against the session. Returns the reply, if the
/// command has one.
pub fn handle_command(
    session: &ScanSession,
    cmd: HostCommand,
    started: Instant,
) -> Option<DeviceMessage<'static>> {
    match cmd {
        HostCommand::Start => match session.start() {
            Ok(()) => {
                log::info!("Scanning started by host command");
                None
            }
            Err(e) => Some(DeviceMessage::error(e.to_string())),
        },
        HostCommand::Stop => {
            session.stop();
            log::info!("Scanning stopped by host command");
            None
        }
        HostCommand::Clear => {
            session.clear();
            None
        }
        HostCommand::Remove { address } => {
            if session.remove(&address) {
                None
            } else {
                Some(DeviceMessage::error(format!("no live detection for {address}")))
            }
        }
        HostCommand::SetAutoPersist { enabled } => {
            session.set_auto_persist(enabled);
            None
        }
        HostCommand::PersistNow => {
            session.persist_now();
            None
        }
        HostCommand::SetLocation { lat, lng } => {
            session.set_location(lat, lng);
            None
        }
        HostCommand::GetStatus => Some(status_message(session, started)),
        HostCommand::GetSaved => match session.saved() {
            Ok(detections) => Some(DeviceMessage::Saved { detections }),
            Err(e) => Some(DeviceMessage::error(e.to_string())),
        },
        HostCommand::DeleteSaved { id } => {
            let result = session.saved().and_then(|saved| {
                match saved.into_iter().find(|d| d.id == Some(id)) {
                    Some(record) => session.delete_saved(&record),
                    None => Ok(false),
                }
            });
            match result {
                Ok(true) => None,
                Ok(false) => Some(DeviceMessage::error(format!("no saved record {id}"))),
                Err(e) => Some(DeviceMessage::error(e.to_string())),
            }
        }
        HostCommand::ClearSaved => match session.clear_saved() {
            Ok(()) => {
                log::info!("Saved history cleared by host command");
                None
            }
            Err(e) => Some(DeviceMessage::error(e.to_string())),
        },
    }
}

/// Hand a radio feed record to the radio adapter.
pub fn handle_feed(radio: &FeedRadio, feed: RadioFeed) -> Result<(), String> {
    match feed {
        RadioFeed::WifiResults { results } => radio.push_wifi_results(results),
        RadioFeed::BleAdv(adv) => radio.push_ble(BleEvent::Advertisement(adv)),
        RadioFeed::BleRaw {
            address,
            rssi,
            data,
        } => {
            let bytes = hex::decode(data.trim()).map_err(|e| format!("bad AD hex: {e}"))?;
            let adv = BleAdvParser::parse(address.as_deref(), rssi, &bytes);
            radio.push_ble(BleEvent::Advertisement(adv));
        }
        RadioFeed::BleFailed { code } => radio.push_ble(BleEvent::ScanFailed(code)),
    }
    Ok(())
}

/// Outbound message for a request the radio adapter has to act on.
pub fn control_message(request: RadioControl) -> DeviceMessage<'static> {
    match request {
        RadioControl::WifiScan => DeviceMessage::WifiScan,
        RadioControl::State { ble, wifi_listener } => DeviceMessage::Radio { ble, wifi_listener },
    }
}

pub fn status_message(session: &ScanSession, started: Instant) -> DeviceMessage<'static> {
    let saved = match session.saved() {
        Ok(saved) => saved.len(),
        Err(e) => {
            log::error!("Failed to read saved history: {e}");
            0
        }
    };
    DeviceMessage::Status {
        scanning: session.is_scanning(),
        auto_persist: session.auto_persist(),
        detections: session.current().len(),
        saved,
        location: session.location(),
        uptime: started.elapsed().as_secs(),
        version: VERSION,
    }
}

// ── NDJSON line reader ─────────────────────────────────────────────────

/// NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: BoundedVec<u8, MAX_LINE_LEN>,
    /// Last yielded line is still in `buf`
    yielded: bool,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: BoundedVec::new(),
            yielded: false,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected. An over-long line is discarded whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if self.yielded {
            self.buf.clear();
            self.yielded = false;
        }

        if byte == b'\n' || byte == b'\r' {
            if self.overflowed {
                log::warn!("Discarded inbound line longer than {MAX_LINE_LEN} bytes");
                self.overflowed = false;
                self.buf.clear();
                return None;
            }
            if self.buf.is_empty() {
                return None;
            }
            self.yielded = true;
            Some(self.buf.as_slice())
        } else {
            if self.buf.push(byte).is_err() {
                // Overflow: drop what we have, skip to the next newline
                self.overflowed = true;
                self.buf.clear();
            }
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}
