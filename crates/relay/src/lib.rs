//! NTRIP correction relay.
//!
//! [`RelayEngine`] pulls correction bytes from the caster and writes them to
//! the receiver, periodically pushes the receiver's GGA position upstream,
//! and tears down and re-establishes the caster leg when it fails or stays
//! silent past the stall threshold. The receiver link is never reopened or
//! switched out of data mode by the engine.

pub mod engine;
pub mod error;
pub mod transport;
pub mod types;

pub use engine::RelayEngine;
pub use error::RelayError;
pub use transport::{CorrectionSource, RoverLink};
pub use types::{RelayConfig, RelayEvent, RelayState, RelayStats};
