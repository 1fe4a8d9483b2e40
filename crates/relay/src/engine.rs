//! The relay state machine.
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Stalled -> ReconnectWait -> Connecting ...
//!             |                                      ^
//!             +------------- connect failed ---------+
//! ```
//!
//! Cancellation is honored from every state and ends in `Stopped` with both
//! legs closed. Only a receiver link failure ends the loop otherwise.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::RelayError;
use crate::transport::{CorrectionSource, RoverLink};
use crate::types::{RelayConfig, RelayEvent, RelayState, RelayStats};

/// Result of one streaming tick.
enum Tick {
    Continue,
    Stall,
    Cancelled,
}

/// Timestamps that survive reconnects.
struct Cadence {
    last_upload: Instant,
    last_stats: Instant,
}

/// Moves corrections from a [`CorrectionSource`] to a [`RoverLink`] and
/// position sentences the other way, reconnecting the source whenever it
/// fails or goes quiet.
pub struct RelayEngine<C, R> {
    source: C,
    rover: R,
    config: RelayConfig,
    state: RelayState,
    stats: RelayStats,
    events_tx: Option<mpsc::Sender<RelayEvent>>,
}

impl<C, R> RelayEngine<C, R>
where
    C: CorrectionSource,
    R: RoverLink,
{
    /// `rover` must already be in data mode.
    pub fn new(source: C, rover: R, config: RelayConfig) -> Self {
        Self {
            source,
            rover,
            config,
            state: RelayState::Idle,
            stats: RelayStats::default(),
            events_tx: None,
        }
    }

    /// Publishes [`RelayEvent`]s on `tx`. A full channel drops events.
    pub fn with_events(mut self, tx: mpsc::Sender<RelayEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn into_parts(self) -> (C, R) {
        (self.source, self.rover)
    }

    /// Runs until `cancel` fires or the receiver link fails.
    ///
    /// Both legs are closed before returning either way.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RelayStats, RelayError> {
        let started = Instant::now();
        let mut cadence = Cadence {
            last_upload: started,
            last_stats: started,
        };
        let mut first_connect = true;

        info!(
            upload_interval_secs = self.config.position_interval.map(|d| d.as_secs_f64()),
            stall_threshold_secs = self.config.stall_threshold.as_secs_f64(),
            reconnect_delay_secs = self.config.reconnect_delay.as_secs_f64(),
            "relay engine starting"
        );
        self.set_state(RelayState::Connecting);

        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            match self.state {
                RelayState::Idle | RelayState::Connecting => {
                    if !first_connect {
                        self.stats.reconnects += 1;
                    }
                    first_connect = false;

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Ok(()),
                        r = self.source.connect(self.config.connect_timeout) => r,
                    };

                    match result {
                        Ok(()) => {
                            self.stats.consecutive_stalls = 0;
                            self.stats.last_activity = Some(Instant::now());
                            self.set_state(RelayState::Streaming);
                        }
                        Err(e) => {
                            warn!(error = %e, auth = e.is_auth(), "caster connect failed");
                            self.set_state(RelayState::ReconnectWait);
                        }
                    }
                }
                RelayState::Streaming => match self.tick(&cancel, &mut cadence).await {
                    Ok(Tick::Continue) => {}
                    Ok(Tick::Stall) => self.set_state(RelayState::Stalled),
                    Ok(Tick::Cancelled) => break Ok(()),
                    Err(e) => break Err(e),
                },
                RelayState::Stalled => {
                    self.source.close().await;
                    self.stats.consecutive_stalls += 1;
                    self.stats.total_stalls += 1;
                    warn!(
                        consecutive = self.stats.consecutive_stalls,
                        bytes_forwarded = self.stats.bytes_forwarded,
                        "caster stalled, closing session"
                    );
                    self.emit(RelayEvent::Stalled {
                        consecutive: self.stats.consecutive_stalls,
                    });
                    self.set_state(RelayState::ReconnectWait);
                }
                RelayState::ReconnectWait => {
                    debug!(
                        delay_secs = self.config.reconnect_delay.as_secs_f64(),
                        "waiting before reconnect"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                    self.set_state(RelayState::Connecting);
                }
                RelayState::Stopped => break Ok(()),
            }
        };

        if let Err(e) = &outcome {
            error!(error = %e, "relay stopping on receiver link failure");
        }

        self.source.close().await;
        self.rover.close().await;
        self.set_state(RelayState::Stopped);
        info!(
            bytes_forwarded = self.stats.bytes_forwarded,
            positions_sent = self.stats.positions_sent,
            reconnects = self.stats.reconnects,
            stalls = self.stats.total_stalls,
            "relay engine stopped"
        );

        outcome.map(|()| self.stats.clone())
    }

    /// One pass of the streaming loop: position upload first, then one
    /// bounded receive.
    async fn tick(
        &mut self,
        cancel: &CancellationToken,
        cadence: &mut Cadence,
    ) -> Result<Tick, RelayError> {
        let now = Instant::now();

        if let Some(interval) = self.config.position_interval
            && now.duration_since(cadence.last_upload) >= interval
        {
            cadence.last_upload = now;

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Tick::Cancelled),
                r = self.rover.read_position(self.config.position_read_timeout) => r,
            };

            let read = match read {
                Ok(read) => read,
                Err(e) if e.is_link_failure() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "position read failed");
                    None
                }
            };

            match read {
                Some(sample) => {
                    if !sample.checksum_valid {
                        debug!(address = sample.address(), "forwarding position with bad checksum");
                    }
                    if let Err(e) = self.source.send_position(sample.as_bytes()).await {
                        warn!(error = %e, "position upload failed");
                        return Ok(Tick::Stall);
                    }
                    self.stats.positions_sent += 1;
                    if self.stats.positions_sent == 1 {
                        info!(sentence = %sample.sentence.trim_end(), "first position sent to caster");
                    } else {
                        trace!(sentence = %sample.sentence.trim_end(), "position sent to caster");
                    }
                    self.emit(RelayEvent::PositionSent {
                        bytes: sample.sentence.len(),
                    });
                }
                None => debug!("no position sentence from receiver"),
            }
        }

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Tick::Cancelled),
            r = self.source.receive(self.config.receive_timeout) => r,
        };

        match received {
            Ok(Some(chunk)) => {
                self.rover.write_corrections(&chunk).await?;
                self.stats.bytes_forwarded += chunk.len() as u64;
                self.stats.last_activity = Some(Instant::now());
                trace!(bytes = chunk.len(), "forwarded correction chunk");
            }
            Ok(None) => {
                let idle = self
                    .stats
                    .last_activity
                    .map_or(Duration::ZERO, |t| t.elapsed());
                if idle > self.config.stall_threshold {
                    warn!(idle_secs = idle.as_secs_f64(), "no correction data from caster");
                    return Ok(Tick::Stall);
                }
            }
            Err(e) => {
                warn!(error = %e, "caster receive failed");
                return Ok(Tick::Stall);
            }
        }

        let now = Instant::now();
        if now.duration_since(cadence.last_stats) >= self.config.stats_interval {
            cadence.last_stats = now;
            info!(
                bytes_forwarded = self.stats.bytes_forwarded,
                positions_sent = self.stats.positions_sent,
                reconnects = self.stats.reconnects,
                "relay statistics"
            );
        }

        Ok(Tick::Continue)
    }

    fn set_state(&mut self, to: RelayState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, "relay state changed");
        self.emit(RelayEvent::StateChanged { from, to });
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.try_send(event);
        }
    }
}
