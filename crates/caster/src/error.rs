//! Error types for the caster session.

use std::time::Duration;

/// Errors produced by a caster session.
#[derive(Debug, thiserror::Error)]
pub enum CasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("connection closed by caster")]
    Closed,

    #[error("not connected")]
    NotConnected,

    #[error("caster rejected request: {status}")]
    Rejected { status: String },
}

impl CasterError {
    /// Returns `true` if the caster answered but refused the request
    /// (bad credentials or unknown mountpoint).
    pub fn is_auth(&self) -> bool {
        matches!(self, CasterError::Rejected { .. })
    }
}
