//! Relay error types.

use rtkbridge_receiver::ReceiverError;

/// Fatal outcomes of the relay loop.
///
/// Caster failures are recovered inside the engine and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("receiver link failed: {0}")]
    Link(#[from] ReceiverError),
}
