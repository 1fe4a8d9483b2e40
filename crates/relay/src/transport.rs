//! The two legs of the relay as traits.
//!
//! [`CorrectionSource`] is implemented for
//! [`CasterSession`](rtkbridge_caster::CasterSession) and [`RoverLink`] for
//! [`ReceiverLink`](rtkbridge_receiver::ReceiverLink). Neither trait can open
//! or switch modes, so the engine cannot disturb the receiver's data mode
//! while it reconnects the caster.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rtkbridge_caster::{CasterError, CasterSession};
use rtkbridge_receiver::{PositionSample, ReceiverError, ReceiverLink};
use tokio::io::{AsyncRead, AsyncWrite};

/// Network side: where corrections come from and positions go to.
pub trait CorrectionSource: Send {
    /// Opens a fresh connection and completes the handshake.
    fn connect(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CasterError>> + Send + '_>>;

    /// One chunk of correction bytes, or `None` if nothing arrived in time.
    fn receive(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CasterError>> + Send + '_>>;

    fn send_position<'a>(
        &'a mut self,
        sentence: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), CasterError>> + Send + 'a>>;

    /// Idempotent.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Receiver side, already in data mode.
pub trait RoverLink: Send {
    fn write_corrections<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReceiverError>> + Send + 'a>>;

    /// Freshest position sentence within `timeout`, if any.
    fn read_position(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PositionSample>, ReceiverError>> + Send + '_>>;

    /// Idempotent.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl CorrectionSource for CasterSession {
    fn connect(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CasterError>> + Send + '_>> {
        Box::pin(CasterSession::connect(self, timeout))
    }

    fn receive(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CasterError>> + Send + '_>> {
        Box::pin(CasterSession::receive(self, timeout))
    }

    fn send_position<'a>(
        &'a mut self,
        sentence: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), CasterError>> + Send + 'a>> {
        Box::pin(CasterSession::send_position(self, sentence))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(CasterSession::close(self))
    }
}

impl<T> RoverLink for ReceiverLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn write_corrections<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReceiverError>> + Send + 'a>> {
        Box::pin(self.write_raw(bytes))
    }

    fn read_position(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PositionSample>, ReceiverError>> + Send + '_>>
    {
        Box::pin(ReceiverLink::read_position(self, timeout))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(ReceiverLink::close(self))
    }
}
