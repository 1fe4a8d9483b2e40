//! Provisioning error types.

use rtkbridge_receiver::ReceiverError;

use crate::controller::Step;

/// Reasons a provisioning run stops early.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("receiver link failure: {0}")]
    Link(ReceiverError),

    #[error("receiver rejected {step} step: {response}")]
    Rejected { step: Step, response: String },

    #[error("invalid provisioning settings: {0}")]
    InvalidSettings(String),
}
