//! Binary status frames from the realtime channel.
//!
//! Every binary message starts with an 8-byte header that is skipped
//! unconditionally. The payload is a packed run of 24-byte records:
//!
//! ```text
//! ┌────────────────────────────┬──────────────────────┐
//! │ identifier (16 bytes)      │ value (f64, LE)      │
//! └────────────────────────────┴──────────────────────┘
//! ```
//!
//! There is no per-record length or checksum. A trailing remainder shorter
//! than one record is dropped without error, and a layout change on the
//! controller side would be silently misread.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the message header preceding every binary payload.
pub const HEADER_LEN: usize = 8;

/// Length of one identifier/value record.
pub const RECORD_LEN: usize = 24;

const ID_LEN: usize = 16;
const HEADER_MARKER: u8 = 0x03;

// ── Values ───────────────────────────────────────────────────────────

/// A reading carried by a value update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Number(f64),
    Text(String),
    /// Anything else the controller puts in a value slot (`null`, booleans,
    /// lists). Kept so one odd reading does not fail the whole document.
    Other(serde_json::Value),
}

impl StateValue {
    /// Numeric view of the value. Text is parsed leniently, booleans read
    /// as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Other(serde_json::Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Other(_) => None,
        }
    }
}

/// One `(identifier, value)` pair decoded from the realtime channel.
///
/// No ordering guarantee relative to other updates beyond buffer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEvent {
    /// Canonical 8-4-4-4-12 rendering of the 16 identifier bytes.
    pub id: String,
    pub value: StateValue,
}

// ── Decoder ──────────────────────────────────────────────────────────

/// Decode a binary value-state buffer into zero or more events.
///
/// Never fails: short buffers and trailing partial records yield fewer
/// events rather than an error.
pub fn decode_value_frame(buf: &[u8]) -> Vec<ValueEvent> {
    let Some(mut payload) = buf.get(HEADER_LEN..) else {
        return Vec::new();
    };

    let mut events = Vec::with_capacity(payload.len() / RECORD_LEN);
    while let Some((record, rest)) = payload.split_first_chunk::<RECORD_LEN>() {
        events.push(decode_record(record));
        payload = rest;
    }
    events
}

fn decode_record(record: &[u8; RECORD_LEN]) -> ValueEvent {
    let (id_bytes, value_bytes) = record.split_at(ID_LEN);

    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(id_bytes);

    let mut raw = [0u8; RECORD_LEN - ID_LEN];
    raw.copy_from_slice(value_bytes);

    ValueEvent {
        id: Uuid::from_bytes(id).hyphenated().to_string(),
        value: StateValue::Number(f64::from_le_bytes(raw)),
    }
}

// ── Header introspection ─────────────────────────────────────────────

/// Parsed form of the 8-byte message header.
///
/// Only used for trace logging; decoding never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message kind byte (2 = value states, 3 = text states, 6 = keep-alive, ...).
    pub kind: u8,
    pub info: u8,
    /// Declared payload length of the message that follows.
    pub payload_len: u32,
}

impl MessageHeader {
    /// Parse a header from the start of `buf`, if it carries the marker byte.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let header: &[u8; HEADER_LEN] = buf.first_chunk()?;
        if header[0] != HEADER_MARKER {
            return None;
        }
        Some(Self {
            kind: header[1],
            info: header[2],
            payload_len: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
