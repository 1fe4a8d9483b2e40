//! Public types for the relay engine.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Relay engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Created, not yet running.
    Idle,
    /// Caster handshake in progress.
    Connecting,
    /// Forwarding corrections.
    Streaming,
    /// Caster leg declared dead; about to be torn down.
    Stalled,
    /// Waiting out the fixed backoff before the next connect.
    ReconnectWait,
    /// Terminal: both legs closed.
    Stopped,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Idle => "idle",
            RelayState::Connecting => "connecting",
            RelayState::Streaming => "streaming",
            RelayState::Stalled => "stalled",
            RelayState::ReconnectWait => "reconnect-wait",
            RelayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Timing knobs of the relay loop.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Position upload cadence. `None` disables uploads.
    pub position_interval: Option<Duration>,
    /// Bound on one position read from the receiver.
    pub position_read_timeout: Duration,
    /// Bound on one caster receive.
    pub receive_timeout: Duration,
    /// Silence longer than this is a stall.
    pub stall_threshold: Duration,
    /// Fixed wait between a stall (or failed connect) and the next connect.
    pub reconnect_delay: Duration,
    /// Bound on TCP connect + handshake.
    pub connect_timeout: Duration,
    /// Byte counter log interval.
    pub stats_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            position_interval: Some(Duration::from_secs(5)),
            position_read_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
            stall_threshold: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// Counters kept by the engine; returned from `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub bytes_forwarded: u64,
    /// Last time correction bytes arrived (or the caster connected).
    pub last_activity: Option<Instant>,
    /// Stalls since the last successful connect.
    pub consecutive_stalls: u32,
    pub total_stalls: u64,
    pub positions_sent: u64,
    /// Connect attempts after the first.
    pub reconnects: u64,
}

/// Notifications published while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    StateChanged { from: RelayState, to: RelayState },
    /// A position sentence went to the caster.
    PositionSent { bytes: usize },
    /// The caster leg went silent or failed.
    Stalled { consecutive: u32 },
}
