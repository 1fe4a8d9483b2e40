//! Error types for the receiver link.

use crate::link::LinkMode;

/// Errors produced by the receiver link.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed")]
    Closed,

    #[error("no response from receiver (wrong baud rate or device disconnected?)")]
    NoResponse,

    #[error("receiver rejected command: {0}")]
    Rejected(String),

    #[error("{operation} requires {required} mode but link is in {current} mode")]
    WrongMode {
        operation: &'static str,
        required: LinkMode,
        current: LinkMode,
    },
}

impl ReceiverError {
    /// Returns `true` for failures of the serial device itself, as opposed
    /// to the receiver refusing a command or a caller misusing the link.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ReceiverError::Open { .. }
                | ReceiverError::Io(_)
                | ReceiverError::Closed
                | ReceiverError::NoResponse
        )
    }
}
