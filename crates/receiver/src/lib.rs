//! Serial link to the GNSS receiver.
//!
//! The relay port of the receiver is used in two mutually exclusive ways:
//! line-based commands at a prompt ([`LinkMode::Command`]) and raw correction
//! input with NMEA output ([`LinkMode::Data`]). [`ReceiverLink`] tracks which
//! one is active and refuses operations that belong to the other.

pub mod commands;
pub mod endpoint;
pub mod error;
pub mod link;
pub mod nmea;
pub mod reader;

pub use commands::DataOutputConfig;
pub use endpoint::ReceiverEndpoint;
pub use error::ReceiverError;
pub use link::{LinkMode, ReceiverLink};
pub use nmea::{PositionSample, SentenceScanner};
pub use reader::ResponseReader;

use std::time::Duration;

/// Written to the port to force it back to the command prompt.
pub const WAKE_SEQUENCE: &[u8] = b"SSSSSSSSSS\r\n";

/// Pause after opening the device or sending the wake sequence.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Overall bound for one command/response exchange.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Quiet period that ends a command response once bytes have arrived.
pub const RESPONSE_IDLE_GAP: Duration = Duration::from_millis(300);
