//! Serial device settings.

use std::fmt;

/// Baud rate the mosaic relay port ships with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial device path and speed. Framing is always 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverEndpoint {
    pub device: String,
    pub baud_rate: u32,
}

impl ReceiverEndpoint {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for ReceiverEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.device, self.baud_rate)
    }
}
