//! Receiver provisioning for NTRIP relay operation.
//!
//! [`ConfigurationController`] drives a fixed command sequence over a
//! [`ReceiverLink`](rtkbridge_receiver::ReceiverLink) in command mode:
//!
//! 1. **Verify**: benign query, proves the receiver answers at all
//! 2. **Login**: optional, failure only warns
//! 3. **Output**: NMEA flag and GGA stream on the relay port
//! 4. **NTRIP**: connection settings, then a re-query to confirm
//! 5. **Persist**: write settings to non-volatile storage
//!
//! An explicit rejection at any step aborts the run. Nothing is rolled back.

pub mod controller;
pub mod error;
pub mod settings;

pub use controller::{ConfigurationController, ProvisioningReport, Step, StepOutcome};
pub use error::ProvisioningError;
pub use settings::{NtripMode, NtripSettings, ProvisioningConfig, ReceiverLogin};

use std::time::Duration;

/// Pause between provisioning steps.
pub const STEP_DELAY: Duration = Duration::from_millis(500);
