//! One caster connection at a time.
//!
//! Each [`CasterSession::connect`] opens a fresh socket; a connection is
//! never reused after a failure or [`CasterSession::close`].

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::endpoint::CasterEndpoint;
use crate::error::CasterError;
use crate::handshake::{
    HandshakeOutcome, HeaderSkipper, build_request, classify_response, header_pending,
    response_complete,
};
use crate::{HANDSHAKE_READ_LIMIT, RECEIVE_CHUNK_SIZE, USER_AGENT};

/// Lifecycle of the caster connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket open, waiting for the status line.
    Handshaking,
    /// Request accepted, corrections flowing.
    Streaming,
    /// Last connect or I/O attempt failed; the socket is gone.
    Failed,
}

/// A live socket plus stream bytes already read past the handshake header.
struct CasterConnection {
    stream: TcpStream,
    pending: Vec<u8>,
}

/// Session with a single NTRIP caster.
pub struct CasterSession {
    endpoint: CasterEndpoint,
    user_agent: String,
    state: ConnectionState,
    conn: Option<CasterConnection>,
}

impl CasterSession {
    pub fn new(endpoint: CasterEndpoint) -> Self {
        Self {
            endpoint,
            user_agent: USER_AGENT.to_string(),
            state: ConnectionState::Disconnected,
            conn: None,
        }
    }

    /// Overrides the `User-Agent` token sent with the request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn endpoint(&self) -> &CasterEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Streaming
    }

    /// Opens a new connection and performs the mountpoint handshake.
    ///
    /// TCP connect, request write and status-line read are all bounded by
    /// `timeout`. Any previous connection is closed first.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), CasterError> {
        self.close().await;

        info!(caster = %self.endpoint, "connecting to caster");
        self.state = ConnectionState::Handshaking;

        let result =
            tokio::time::timeout(timeout, open_and_handshake(&self.endpoint, &self.user_agent))
                .await;

        match result {
            Ok(Ok(conn)) => {
                self.conn = Some(conn);
                self.state = ConnectionState::Streaming;
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                Err(CasterError::HandshakeTimeout(timeout))
            }
        }
    }

    /// Reads the next correction chunk.
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout`. A closed or
    /// broken socket is an error and tears the connection down.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, CasterError> {
        let conn = self.conn.as_mut().ok_or(CasterError::NotConnected)?;

        if !conn.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut conn.pending)));
        }

        let mut buf = vec![0u8; RECEIVE_CHUNK_SIZE];
        let result = tokio::time::timeout(timeout, conn.stream.read(&mut buf)).await;

        match result {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.fail("caster closed the stream");
                Err(CasterError::Closed)
            }
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Ok(Err(e)) => {
                self.fail("receive failed");
                Err(e.into())
            }
        }
    }

    /// Pushes a position sentence upstream.
    pub async fn send_position(&mut self, sentence: &[u8]) -> Result<(), CasterError> {
        let conn = self.conn.as_mut().ok_or(CasterError::NotConnected)?;

        let result = async {
            conn.stream.write_all(sentence).await?;
            conn.stream.flush().await
        }
        .await;

        if let Err(e) = result {
            self.fail("position upload failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Closes the connection. Safe to call in any state.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.stream.shutdown().await;
            debug!(caster = %self.endpoint, "caster connection closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, reason: &str) {
        warn!(caster = %self.endpoint, reason, "caster connection failed");
        self.conn = None;
        self.state = ConnectionState::Failed;
    }
}

async fn open_and_handshake(
    endpoint: &CasterEndpoint,
    user_agent: &str,
) -> Result<CasterConnection, CasterError> {
    let mut stream = TcpStream::connect(endpoint.address()).await?;
    stream.set_nodelay(true)?;

    let request = build_request(endpoint, user_agent);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Read until the reply can be classified, the peer closes, or the
    // prefix limit is hit.
    let mut response = Vec::with_capacity(HANDSHAKE_READ_LIMIT);
    let mut buf = [0u8; HANDSHAKE_READ_LIMIT];
    while response.len() < HANDSHAKE_READ_LIMIT && !response_complete(&response) {
        let room = HANDSHAKE_READ_LIMIT - response.len();
        let n = stream.read(&mut buf[..room]).await?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
    }

    match classify_response(&response) {
        HandshakeOutcome::Accepted { body } => {
            let body = if header_pending(&response) {
                skip_header(&mut stream, &response).await?
            } else {
                body
            };
            info!(
                caster = %endpoint,
                status = %first_line(&response),
                early_bytes = body.len(),
                "caster accepted request"
            );
            Ok(CasterConnection {
                stream,
                pending: body,
            })
        }
        HandshakeOutcome::Rejected { status } => {
            warn!(caster = %endpoint, %status, "caster rejected request");
            Err(CasterError::Rejected { status })
        }
        HandshakeOutcome::Empty => Err(CasterError::Closed),
    }
}

/// Discards the rest of an accepted header block that outgrew the first
/// read. Returns the stream bytes read past the terminator.
async fn skip_header(stream: &mut TcpStream, prefix: &[u8]) -> Result<Vec<u8>, CasterError> {
    let mut skipper = HeaderSkipper::new(prefix);
    let mut buf = [0u8; HANDSHAKE_READ_LIMIT];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(CasterError::Closed);
        }
        if let Some(body) = skipper.feed(&buf[..n]) {
            debug!(header_bytes = skipper.discarded(), "skipped oversized response header");
            return Ok(body);
        }
    }
}

fn first_line(response: &[u8]) -> String {
    String::from_utf8_lossy(response)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn read_request(sock: &mut TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut buf = [0u8; 512];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        request
    }

    /// Accepts one connection, answers the request with `reply`, streams
    /// `chunks`, then collects whatever the client sends until it closes.
    /// Resolves to `(request, uploaded)`.
    async fn fake_caster(
        reply: Vec<u8>,
        chunks: Vec<Vec<u8>>,
    ) -> (SocketAddr, JoinHandle<(Vec<u8>, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 512];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            sock.write_all(&reply).await.unwrap();
            for chunk in chunks {
                sock.write_all(&chunk).await.unwrap();
            }

            let mut uploaded = Vec::new();
            let _ = sock.read_to_end(&mut uploaded).await;
            (request, uploaded)
        });

        (addr, handle)
    }

    fn endpoint_for(addr: SocketAddr) -> CasterEndpoint {
        CasterEndpoint::new(addr.ip().to_string(), addr.port(), "VRS1", "u", "p")
    }

    async fn receive_exactly(session: &mut CasterSession, len: usize) -> Vec<u8> {
        let mut received = Vec::new();
        while received.len() < len {
            match session.receive(TIMEOUT).await.unwrap() {
                Some(chunk) => received.extend_from_slice(&chunk),
                None => panic!("timed out after {} of {len} bytes", received.len()),
            }
        }
        received
    }

    #[tokio::test]
    async fn connect_stream_upload_and_close() {
        let chunks = vec![vec![0xD3u8; 120], vec![0x42u8; 80]];
        let (addr, server) = fake_caster(b"ICY 200 OK\r\n".to_vec(), chunks).await;

        let mut session = CasterSession::new(endpoint_for(addr)).with_user_agent("NTRIP test/1.0");
        session.connect(TIMEOUT).await.unwrap();
        assert_eq!(session.state(), ConnectionState::Streaming);

        let received = receive_exactly(&mut session, 200).await;
        assert_eq!(&received[..120], &[0xD3u8; 120][..]);
        assert_eq!(&received[120..], &[0x42u8; 80][..]);

        let gga = b"$GPGGA,120000.00,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*67\r\n";
        session.send_position(gga).await.unwrap();
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let (request, uploaded) = server.await.unwrap();
        assert_eq!(
            request,
            b"GET /VRS1 HTTP/1.0\r\n\
              User-Agent: NTRIP test/1.0\r\n\
              Authorization: Basic dTpw\r\n\
              Accept: */*\r\n\
              Connection: close\r\n\
              \r\n"
        );
        assert_eq!(uploaded, gga);
    }

    #[tokio::test]
    async fn stream_bytes_in_handshake_read_are_not_lost() {
        let mut reply = b"ICY 200 OK\r\n".to_vec();
        reply.extend_from_slice(&[1, 2, 3, 4, 5]);
        let (addr, _server) = fake_caster(reply, vec![vec![6, 7, 8]]).await;

        let mut session = CasterSession::new(endpoint_for(addr));
        session.connect(TIMEOUT).await.unwrap();

        let received = receive_exactly(&mut session, 8).await;
        assert_eq!(received, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn split_http_header_is_not_forwarded() {
        let chunks = vec![
            b"Ntrip-Version: Ntrip/2.0\r\nCache-Control: no-store\r\n\r\n".to_vec(),
            vec![0xD3u8, 0x00, 0x02, 0xAA, 0xBB],
        ];
        let (addr, _server) = fake_caster(b"HTTP/1.1 200 OK\r\n".to_vec(), chunks).await;

        let mut session = CasterSession::new(endpoint_for(addr));
        session.connect(TIMEOUT).await.unwrap();

        let received = receive_exactly(&mut session, 5).await;
        assert_eq!(received, vec![0xD3u8, 0x00, 0x02, 0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn unauthorized_is_auth_error() {
        let (addr, _server) =
            fake_caster(b"HTTP/1.1 401 Unauthorized\r\n\r\n".to_vec(), vec![]).await;

        let mut session = CasterSession::new(endpoint_for(addr));
        let err = session.connect(TIMEOUT).await.unwrap_err();

        assert!(err.is_auth(), "unexpected error: {err}");
        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(matches!(
            session.receive(TIMEOUT).await,
            Err(CasterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn bare_unauthorized_status_is_auth_error_without_waiting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_request(&mut sock).await;
            sock.write_all(b"401 Unauthorized\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut session = CasterSession::new(endpoint_for(addr));
        let err = session.connect(Duration::from_millis(500)).await.unwrap_err();

        assert!(err.is_auth(), "unexpected error: {err}");
        assert!(matches!(
            &err,
            CasterError::Rejected { status } if status == "401 Unauthorized"
        ));
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn oversized_http_header_is_not_forwarded() {
        let mut reply = b"HTTP/1.1 200 OK\r\nX-Pad: ".to_vec();
        reply.extend(std::iter::repeat_n(b'a', 1100));
        reply.extend_from_slice(b"\r\n\r\n");
        let (addr, _server) = fake_caster(reply, vec![vec![0xD3, 0x00, 0x01]]).await;

        let mut session = CasterSession::new(endpoint_for(addr));
        session.connect(TIMEOUT).await.unwrap();

        let received = receive_exactly(&mut session, 3).await;
        assert_eq!(received, vec![0xD3, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn caster_closing_inside_header_is_network_error() {
        let mut reply = b"HTTP/1.1 200 OK\r\nX-Pad: ".to_vec();
        reply.extend(std::iter::repeat_n(b'a', 1100));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_request(&mut sock).await;
            sock.write_all(&reply).await.unwrap();
        });

        let mut session = CasterSession::new(endpoint_for(addr));
        let err = session.connect(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, CasterError::Closed), "unexpected error: {err}");
        assert!(!err.is_auth());
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn silent_caster_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut session = CasterSession::new(endpoint_for(addr));
        let err = session.connect(Duration::from_millis(200)).await.unwrap_err();

        assert!(matches!(err, CasterError::HandshakeTimeout(_)));
        assert!(!err.is_auth());
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut session = CasterSession::new(endpoint_for(addr));
        let err = session.connect(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, CasterError::Io(_)), "unexpected error: {err}");
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn receive_times_out_then_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
        let _server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_request(&mut sock).await;
            sock.write_all(b"ICY 200 OK\r\n").await.unwrap();
            let _ = close_rx.await;
            drop(sock);
        });

        let mut session = CasterSession::new(endpoint_for(addr));
        session.connect(TIMEOUT).await.unwrap();

        let idle = session.receive(Duration::from_millis(100)).await.unwrap();
        assert!(idle.is_none());
        assert!(session.is_connected());

        close_tx.send(()).unwrap();
        let err = session.receive(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, CasterError::Closed));
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn operations_without_connection() {
        let mut session = CasterSession::new(CasterEndpoint::new("127.0.0.1", 1, "X", "u", "p"));

        assert!(matches!(
            session.send_position(b"$GPGGA*00\r\n").await,
            Err(CasterError::NotConnected)
        ));
        assert!(matches!(
            session.receive(TIMEOUT).await,
            Err(CasterError::NotConnected)
        ));

        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
