//! NTRIP caster session.
//!
//! Owns one outbound TCP connection to a correction caster, performs the
//! mountpoint request handshake and exposes bounded receive/send primitives.
//!
//! # Wire format
//!
//! See [`handshake`] for the request layout and response classification.

pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod session;

pub use endpoint::CasterEndpoint;
pub use error::CasterError;
pub use handshake::HandshakeOutcome;
pub use session::{CasterSession, ConnectionState};

use std::time::Duration;

/// Upper bound on the handshake response prefix that is inspected.
pub const HANDSHAKE_READ_LIMIT: usize = 1024;

/// Maximum size of one correction chunk returned by `receive`.
pub const RECEIVE_CHUNK_SIZE: usize = 4096;

/// Default bound on TCP connect + handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User-agent token sent with every request.
pub const USER_AGENT: &str = concat!("NTRIP rtkbridge/", env!("CARGO_PKG_VERSION"));
