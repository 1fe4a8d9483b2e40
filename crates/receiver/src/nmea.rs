//! Position-sentence extraction from the receiver's NMEA output.
//!
//! Only the `$<body>*hh` envelope is parsed; the body is never interpreted
//! beyond its address field.

use chrono::{DateTime, Utc};

use crate::reader::ascii_only;

/// Maximum amount of unconsumed text kept between reads.
pub const SCANNER_CAPACITY: usize = 8 * 1024;

/// A GGA sentence captured from the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSample {
    /// Full sentence including `$`, checksum and trailing `\r\n`.
    pub sentence: String,
    pub captured_at: DateTime<Utc>,
    pub checksum_valid: bool,
}

impl PositionSample {
    pub fn as_bytes(&self) -> &[u8] {
        self.sentence.as_bytes()
    }

    /// Address field, e.g. `GPGGA`.
    pub fn address(&self) -> &str {
        self.sentence
            .trim_start_matches('$')
            .split([',', '*'])
            .next()
            .unwrap_or_default()
    }
}

/// Incremental scanner over the receiver's output stream.
#[derive(Debug, Default)]
pub struct SentenceScanner {
    buf: String,
}

impl SentenceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes. Non-ASCII noise is dropped.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.push_str(&ascii_only(bytes));
        if self.buf.len() > SCANNER_CAPACITY {
            let excess = self.buf.len() - SCANNER_CAPACITY;
            self.buf.drain(..excess);
        }
    }

    /// Consumes every complete sentence in the buffer and returns the last
    /// position sentence among them. A trailing partial sentence is kept.
    pub fn take_latest_position(&mut self) -> Option<PositionSample> {
        let mut latest = None;
        let mut pos = 0;

        let consumed = loop {
            let Some(start) = self.buf[pos..].find('$').map(|i| pos + i) else {
                break self.buf.len();
            };
            let Some(star) = self.buf[start + 1..].find('*').map(|i| start + 1 + i) else {
                break start;
            };

            let body = &self.buf[start + 1..star];
            // A new `$` or a line break before `*` means this sentence was
            // truncated; resume at the next candidate.
            if let Some(i) = body.find(['$', '\r', '\n']) {
                pos = start + 1 + i;
                continue;
            }
            if self.buf.len() < star + 3 {
                break start;
            }

            let checksum = &self.buf[star + 1..star + 3];
            pos = star + 3;
            let Ok(expected) = u8::from_str_radix(checksum, 16) else {
                continue;
            };

            if is_position_address(body) {
                latest = Some(PositionSample {
                    sentence: format!("${body}*{checksum}\r\n"),
                    captured_at: Utc::now(),
                    checksum_valid: nmea_checksum(body) == expected,
                });
            }
        };

        self.buf.drain(..consumed);
        latest
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// XOR of every byte between `$` and `*`.
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// `GPGGA`, `GNGGA`, `GLGGA`, ... : any GNSS talker with the GGA formatter.
fn is_position_address(body: &str) -> bool {
    let address = body.split(',').next().unwrap_or_default();
    address.len() == 5 && address.starts_with('G') && address.ends_with("GGA")
}
