//! Mode-aware serial link to the receiver.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, trace, warn};

use crate::commands::{self, DataOutputConfig};
use crate::endpoint::ReceiverEndpoint;
use crate::error::ReceiverError;
use crate::nmea::{PositionSample, SentenceScanner};
use crate::reader::{ResponseReader, is_transient};
use crate::{COMMAND_TIMEOUT, SETTLE_DELAY, WAKE_SEQUENCE};

/// Poll window used when discarding stale input.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Upper bound on a single input drain.
const DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// What the relay port is currently used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Line-based commands at the receiver prompt.
    Command,
    /// Raw correction input, NMEA output.
    Data,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMode::Command => write!(f, "command"),
            LinkMode::Data => write!(f, "data"),
        }
    }
}

/// Exclusive owner of the receiver's serial port.
///
/// Commands are only accepted in [`LinkMode::Command`], correction bytes and
/// position reads only in [`LinkMode::Data`]. Switching is always explicit:
/// [`enter_command_mode`](Self::enter_command_mode) and
/// [`enter_data_mode`](Self::enter_data_mode).
pub struct ReceiverLink<T> {
    port: T,
    name: String,
    mode: LinkMode,
    reader: ResponseReader,
    settle: Duration,
    scanner: SentenceScanner,
    closed: bool,
}

impl ReceiverLink<SerialStream> {
    /// Opens the serial device (8N1, no flow control) and waits for it to
    /// settle. The link starts at the command prompt.
    pub async fn open(endpoint: &ReceiverEndpoint) -> Result<Self, ReceiverError> {
        info!(device = %endpoint.device, baud = endpoint.baud_rate, "opening receiver link");

        let port = tokio_serial::new(&endpoint.device, endpoint.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| ReceiverError::Open {
                device: endpoint.device.clone(),
                reason: e.to_string(),
            })?;

        tokio::time::sleep(SETTLE_DELAY).await;
        info!(link = %endpoint, "receiver link open");
        Ok(Self::new(port, endpoint.to_string()))
    }
}

impl<T> ReceiverLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-open transport. The link starts in command mode.
    pub fn new(port: T, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
            mode: LinkMode::Command,
            reader: ResponseReader::default(),
            settle: SETTLE_DELAY,
            scanner: SentenceScanner::new(),
            closed: false,
        }
    }

    /// Overrides the reply framing parameters.
    pub fn with_reader(mut self, reader: ResponseReader) -> Self {
        self.reader = reader;
        self
    }

    /// Overrides the pause after the wake sequence.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Forces the port back to the command prompt and discards whatever
    /// output was pending.
    pub async fn enter_command_mode(&mut self) -> Result<(), ReceiverError> {
        self.ensure_open()?;

        debug!(link = %self.name, "sending wake sequence");
        self.port.write_all(WAKE_SEQUENCE).await?;
        self.port.flush().await?;
        tokio::time::sleep(self.settle).await;
        self.drain_input().await?;
        self.scanner.clear();

        if self.mode != LinkMode::Command {
            info!(link = %self.name, "receiver link entered command mode");
        }
        self.mode = LinkMode::Command;
        Ok(())
    }

    /// Sends one command line and collects the reply.
    ///
    /// The reply may be empty; use [`commands::classify_response`] to turn it
    /// into an outcome. Exchanges are strictly sequential.
    pub async fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ReceiverError> {
        self.require(LinkMode::Command, "send_command")?;
        self.drain_input().await?;

        let name = command_name(command);
        debug!(link = %self.name, command = name, "sending receiver command");

        let line = format!("{}\r\n", command.trim());
        self.port.write_all(line.as_bytes()).await?;
        self.port.flush().await?;

        let reply = self.reader.with_max_wait(timeout).read(&mut self.port).await?;
        if reply.trim().is_empty() {
            warn!(link = %self.name, command = name, "no reply from receiver");
        } else {
            trace!(link = %self.name, command = name, reply = %reply.trim(), "receiver reply");
        }
        Ok(reply)
    }

    /// Enables position-sentence output on the relay port and switches the
    /// link to data mode.
    ///
    /// The receiver refusing or ignoring an output command is logged but not
    /// fatal: corrections still flow without position output.
    pub async fn enter_data_mode(&mut self, config: &DataOutputConfig) -> Result<(), ReceiverError> {
        self.require(LinkMode::Command, "enter_data_mode")?;

        for command in [config.enable_output_command(), config.stream_command()] {
            let reply = self.send_command(&command, COMMAND_TIMEOUT).await?;
            if let Err(e) = commands::classify_response(&reply) {
                warn!(
                    link = %self.name,
                    command = command_name(&command),
                    error = %e,
                    "position output not confirmed"
                );
            }
        }

        self.scanner.clear();
        self.mode = LinkMode::Data;
        info!(link = %self.name, port = %config.port, "receiver link entered data mode");
        Ok(())
    }

    /// Forwards correction bytes unmodified.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ReceiverError> {
        self.require(LinkMode::Data, "write_raw")?;
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        Ok(())
    }

    /// Waits up to `timeout` for a position sentence.
    ///
    /// Once one is complete, input that is already queued is read too so
    /// the freshest sentence wins. Everything else scanned is discarded.
    pub async fn read_position(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<PositionSample>, ReceiverError> {
        self.require(LinkMode::Data, "read_position")?;

        let deadline = Instant::now() + timeout;
        let mut latest: Option<PositionSample> = None;
        let mut buf = [0u8; 512];

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = if latest.is_some() {
                DRAIN_POLL.min(deadline - now)
            } else {
                deadline - now
            };

            match tokio::time::timeout(wait, self.port.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    self.scanner.clear();
                    return Err(ReceiverError::Closed);
                }
                Ok(Ok(n)) => {
                    self.scanner.push(&buf[..n]);
                    if let Some(sample) = self.scanner.take_latest_position() {
                        latest = Some(sample);
                    }
                }
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => {
                    self.scanner.clear();
                    return Err(e.into());
                }
            }
        }

        self.scanner.clear();
        if let Some(sample) = &latest
            && !sample.checksum_valid
        {
            debug!(link = %self.name, sentence = %sample.sentence.trim_end(), "position sentence checksum mismatch");
        }
        Ok(latest)
    }

    /// Shuts the transport down. Later calls are no-ops; every other
    /// operation fails with [`ReceiverError::Closed`].
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.port.shutdown().await;
        self.closed = true;
        info!(link = %self.name, "receiver link closed");
    }

    fn ensure_open(&self) -> Result<(), ReceiverError> {
        if self.closed {
            return Err(ReceiverError::Closed);
        }
        Ok(())
    }

    fn require(&self, required: LinkMode, operation: &'static str) -> Result<(), ReceiverError> {
        self.ensure_open()?;
        if self.mode != required {
            return Err(ReceiverError::WrongMode {
                operation,
                required,
                current: self.mode,
            });
        }
        Ok(())
    }

    /// Reads and discards input until the port goes quiet.
    async fn drain_input(&mut self) -> Result<(), ReceiverError> {
        let deadline = Instant::now() + DRAIN_LIMIT;
        let mut buf = [0u8; 512];
        let mut discarded = 0usize;

        while Instant::now() < deadline {
            match tokio::time::timeout(DRAIN_POLL, self.port.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(ReceiverError::Closed),
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            trace!(link = %self.name, discarded, "discarded stale input");
        }
        Ok(())
    }
}

/// Command keyword without arguments, safe to log (arguments may carry
/// credentials).
fn command_name(command: &str) -> &str {
    command.trim().split(',').next().unwrap_or_default()
}
