//! Mountpoint request and response classification.
//!
//! Request (bit-exact):
//!
//! ```text
//! GET /<mountpoint> HTTP/1.0\r\n
//! User-Agent: <token>\r\n
//! Authorization: Basic <base64(user:pass)>\r\n
//! Accept: */*\r\n
//! Connection: close\r\n
//! \r\n
//! ```
//!
//! Only the status line of the reply matters. NTRIP v1 casters answer
//! `ICY 200 OK`, v2 casters answer with a regular HTTP status line followed
//! by header lines, which are skipped in full before streaming starts. A
//! `SOURCETABLE 200 OK` reply means the mountpoint does not exist.

use crate::endpoint::CasterEndpoint;

const HEADER_END: &[u8] = b"\r\n\r\n";
const LINE_END: &[u8] = b"\r\n";

/// Result of inspecting the first response chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Caster accepted the request. `body` holds any stream bytes that
    /// arrived in the same read after the header.
    Accepted { body: Vec<u8> },
    /// Caster answered with something other than a 200 status.
    Rejected { status: String },
    /// Nothing was received.
    Empty,
}

/// Builds the mountpoint request for `endpoint`.
pub fn build_request(endpoint: &CasterEndpoint, user_agent: &str) -> String {
    format!(
        "GET /{} HTTP/1.0\r\n\
         User-Agent: {}\r\n\
         Authorization: Basic {}\r\n\
         Accept: */*\r\n\
         Connection: close\r\n\
         \r\n",
        endpoint.mountpoint(),
        user_agent,
        endpoint.authorization(),
    )
}

/// Classifies the response prefix read right after sending the request.
pub fn classify_response(response: &[u8]) -> HandshakeOutcome {
    if response.is_empty() {
        return HandshakeOutcome::Empty;
    }

    let status = status_line(response);
    if status.starts_with("SOURCETABLE") {
        return HandshakeOutcome::Rejected { status };
    }

    let text = String::from_utf8_lossy(response);
    if status_accepted(&status) || text.contains("200 OK") {
        HandshakeOutcome::Accepted {
            body: body_after_header(response, &status).to_vec(),
        }
    } else {
        HandshakeOutcome::Rejected { status }
    }
}

/// Returns `true` once enough of the reply has arrived to classify it: the
/// `ICY` status line, a non-200 status line, or a complete HTTP header
/// block.
pub fn response_complete(response: &[u8]) -> bool {
    if !response.contains(&b'\n') {
        return false;
    }
    if response.starts_with(b"ICY") || find(response, HEADER_END).is_some() {
        return true;
    }
    let status = status_line(response);
    status.starts_with("SOURCETABLE") || !status_accepted(&status)
}

/// Returns `true` when an accepted reply still has HTTP header lines on the
/// wire that must be skipped before the correction stream starts.
pub fn header_pending(response: &[u8]) -> bool {
    !response.starts_with(b"ICY") && find(response, HEADER_END).is_none()
}

/// Scans for the end of an HTTP header block that spans several reads.
///
/// Only the last few bytes are retained between chunks, so oversized
/// headers are discarded without buffering them.
#[derive(Debug, Default)]
pub struct HeaderSkipper {
    tail: Vec<u8>,
    discarded: usize,
}

impl HeaderSkipper {
    /// Starts from the header prefix already read.
    pub fn new(prefix: &[u8]) -> Self {
        let mut skipper = Self::default();
        skipper.keep_tail(prefix);
        skipper
    }

    /// Feeds the next chunk. Returns the stream bytes that follow the
    /// header terminator once it is found.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);
        match find(&window, HEADER_END) {
            Some(pos) => {
                let end = pos + HEADER_END.len();
                self.discarded += end;
                Some(window[end..].to_vec())
            }
            None => {
                self.keep_tail(&window);
                None
            }
        }
    }

    /// Header bytes dropped so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    fn keep_tail(&mut self, bytes: &[u8]) {
        let keep = bytes.len().min(HEADER_END.len() - 1);
        self.discarded += bytes.len() - keep;
        self.tail = bytes[bytes.len() - keep..].to_vec();
    }
}

fn status_accepted(status: &str) -> bool {
    status.split_whitespace().nth(1) == Some("200") || status.contains("200 OK")
}

fn status_line(response: &[u8]) -> String {
    let end = response
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(response.len());
    String::from_utf8_lossy(&response[..end]).trim().to_string()
}

fn body_after_header<'a>(response: &'a [u8], status: &str) -> &'a [u8] {
    if let Some(pos) = find(response, HEADER_END) {
        return &response[pos + HEADER_END.len()..];
    }
    // v1 casters may start streaming right after the single status line.
    if status.starts_with("ICY")
        && let Some(pos) = find(response, LINE_END)
    {
        return &response[pos + LINE_END.len()..];
    }
    &[]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
