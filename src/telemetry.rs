//! Telemetry Parser (C4, spec §4.4): a sliding-window byte scanner over the
//! Ctl socket's receive stream. No framing byte on this channel is
//! length-prefixed, so the scanner has to recognize Short/Long telemetry
//! records and `CC 5A` command echoes purely from their shape.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::codec::xor_range;

const LONG_LEN: usize = 15;
const SHORT_LEN: usize = 10;
const ECHO_LEN: usize = 7;

const PHOTO_DEBOUNCE: Duration = Duration::from_millis(1000);
const RECORD_DEBOUNCE: Duration = Duration::from_millis(2000);

/// A decoded telemetry record (spec §3 `Telemetry`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryRecord {
    Short {
        voltage_raw: u8,
        status: u8,
        battery_percent: u8,
    },
    Long {
        battery_percent: u8,
        status: u8,
    },
}

impl TelemetryRecord {
    pub fn battery_percent(&self) -> u8 {
        match self {
            TelemetryRecord::Short { battery_percent, .. } => *battery_percent,
            TelemetryRecord::Long { battery_percent, .. } => *battery_percent,
        }
    }

    fn photo_bit(&self) -> bool {
        match self {
            TelemetryRecord::Short { status, .. } => status & 0x01 != 0,
            TelemetryRecord::Long { status, .. } => status & 0x02 != 0,
        }
    }

    fn record_bit(&self) -> bool {
        match self {
            TelemetryRecord::Short { status, .. } => status & 0x02 != 0,
            TelemetryRecord::Long { status, .. } => status & 0x04 != 0,
        }
    }
}

/// Derive `battery_percent` from a short-form record's decidecimal voltage
/// (spec §3): `clamp(0, 100, round(voltage_volts * 160.7142 - 517.8571))`.
fn battery_from_voltage_raw(voltage_raw: u8) -> u8 {
    let volts = voltage_raw as f32 / 10.0;
    let pct = (volts * 160.7142 - 517.8571).round();
    pct.clamp(0.0, 100.0) as u8
}

/// One item the scanner can recognize in the Ctl byte stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanResult {
    Telemetry(TelemetryRecord),
    /// A `CC 5A`-prefixed remote-command echo, routed onward to the command
    /// sequencer's echo listener.
    CommandEcho([u8; ECHO_LEN]),
}

/// Sliding-window scanner: bytes go in one at a time (or in bulk via
/// [`TelemetryParser::ingest`]), recognized records come out.
#[derive(Debug, Default)]
pub struct TelemetryParser {
    window: VecDeque<u8>,
}

impl TelemetryParser {
    pub fn new() -> Self {
        TelemetryParser::default()
    }

    /// Reset the scan window (spec §4.7: cleared on watchdog reconnect).
    pub fn reset(&mut self) {
        self.window.clear();
    }

    fn contiguous(&self, from_end: usize) -> Vec<u8> {
        let len = self.window.len();
        self.window.iter().skip(len - from_end).copied().collect()
    }

    fn try_long(&self) -> Option<TelemetryRecord> {
        if self.window.len() != LONG_LEN {
            return None;
        }
        let w = self.contiguous(LONG_LEN);
        if w[0] == 0x66 && w[1] == 0x0F && w[14] == 0x99 && xor_range(&w, 2, 12) == w[13] {
            Some(TelemetryRecord::Long {
                battery_percent: w[3],
                status: w[4],
            })
        } else {
            None
        }
    }

    fn try_short(&self) -> Option<TelemetryRecord> {
        if self.window.len() < SHORT_LEN {
            return None;
        }
        let w = self.contiguous(SHORT_LEN);
        if w[0] == 0x66 && w[1] != 0x0F && xor_range(&w, 1, 8) == w[9] {
            Some(TelemetryRecord::Short {
                voltage_raw: w[1],
                status: w[2],
                battery_percent: battery_from_voltage_raw(w[1]),
            })
        } else {
            None
        }
    }

    fn try_echo(&self) -> Option<[u8; ECHO_LEN]> {
        if self.window.len() < ECHO_LEN {
            return None;
        }
        let w = self.contiguous(ECHO_LEN);
        if w[0] == 0xCC && w[1] == 0x5A {
            let mut arr = [0u8; ECHO_LEN];
            arr.copy_from_slice(&w);
            Some(arr)
        } else {
            None
        }
    }

    /// Append one byte and report a recognized record, if the window now
    /// matches one. A match consumes the window (the matched bytes are not
    /// re-attributed to a later record); no match slides the window by one
    /// byte once it has reached its 15-byte cap.
    pub fn push(&mut self, byte: u8) -> Option<ScanResult> {
        self.window.push_back(byte);

        if let Some(rec) = self.try_long() {
            self.window.clear();
            return Some(ScanResult::Telemetry(rec));
        }
        if let Some(rec) = self.try_short() {
            self.window.clear();
            return Some(ScanResult::Telemetry(rec));
        }
        if let Some(echo) = self.try_echo() {
            self.window.clear();
            return Some(ScanResult::CommandEcho(echo));
        }
        if self.window.len() >= LONG_LEN {
            self.window.pop_front();
        }
        None
    }

    /// Feed a whole datagram's worth of bytes, returning every record
    /// recognized along the way, in arrival order.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<ScanResult> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

/// Output-layer debouncer for the photo/record trigger bits (spec §4.4:
/// "this debouncing lives in the parser output layer, not the scanner").
/// A rise is only reported when seen across two consecutive telemetry
/// records within the relevant window.
#[derive(Debug, Default)]
pub struct TriggerEdgeDetector {
    last: Option<(bool, bool, Instant)>,
}

/// Debounced trigger events derived from consecutive telemetry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    PhotoRequested,
    RecordToggle,
}

impl TriggerEdgeDetector {
    pub fn new() -> Self {
        TriggerEdgeDetector::default()
    }

    /// Feed the next telemetry record in arrival order; returns any trigger
    /// events it caused.
    pub fn observe(&mut self, record: &TelemetryRecord) -> Vec<TriggerEvent> {
        let now = Instant::now();
        let photo = record.photo_bit();
        let rec = record.record_bit();
        let mut events = Vec::new();

        if let Some((last_photo, last_rec, last_at)) = self.last {
            let elapsed = now.duration_since(last_at);
            if !last_photo && photo && elapsed <= PHOTO_DEBOUNCE {
                events.push(TriggerEvent::PhotoRequested);
            }
            if !last_rec && rec && elapsed <= RECORD_DEBOUNCE {
                events.push(TriggerEvent::RecordToggle);
            }
        }

        self.last = Some((photo, rec, now));
        events
    }
}
