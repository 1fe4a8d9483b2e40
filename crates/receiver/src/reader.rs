//! Timing-based reply framing for the command prompt.
//!
//! The receiver gives no length prefix and no guaranteed terminator, so a
//! reply is considered complete when one of these happens first:
//!
//! 1. a port prompt (`COM2>`, `USB1>`, `IP10>`) ends the accumulated text,
//! 2. no byte arrived for `idle_gap` after the first byte,
//! 3. `max_wait` elapsed since the read started.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::{COMMAND_TIMEOUT, RESPONSE_IDLE_GAP};

/// Reads one command reply using the prompt / idle-gap / deadline rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseReader {
    pub max_wait: Duration,
    pub idle_gap: Duration,
}

impl Default for ResponseReader {
    fn default() -> Self {
        Self {
            max_wait: COMMAND_TIMEOUT,
            idle_gap: RESPONSE_IDLE_GAP,
        }
    }
}

impl ResponseReader {
    pub fn new(max_wait: Duration, idle_gap: Duration) -> Self {
        Self { max_wait, idle_gap }
    }

    /// Same idle gap, different overall bound.
    pub fn with_max_wait(self, max_wait: Duration) -> Self {
        Self { max_wait, ..self }
    }

    /// Accumulates a reply from `port`. Non-ASCII bytes are dropped.
    ///
    /// An empty string means the receiver stayed silent for `max_wait`.
    pub async fn read<R>(&self, port: &mut R) -> io::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + self.max_wait;
        let mut text = String::new();
        let mut got_bytes = false;
        let mut buf = [0u8; 256];

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let wait = if got_bytes {
                self.idle_gap.min(remaining)
            } else {
                remaining
            };

            match tokio::time::timeout(wait, port.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    if !got_bytes {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    break;
                }
                Ok(Ok(n)) => {
                    got_bytes = true;
                    text.push_str(&ascii_only(&buf[..n]));
                    if ends_with_prompt(&text) {
                        break;
                    }
                }
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => return Err(e),
            }
        }

        Ok(text)
    }
}

/// Keeps printable ASCII plus CR, LF and TAB.
pub(crate) fn ascii_only(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| {
            b.is_ascii() && (!b.is_ascii_control() || matches!(**b, b'\r' | b'\n' | b'\t'))
        })
        .map(|&b| b as char)
        .collect()
}

/// Returns `true` if the last line of `text` is a port prompt.
pub fn ends_with_prompt(text: &str) -> bool {
    let trimmed = text.trim_end();
    let Some(name) = trimmed.strip_suffix('>') else {
        return false;
    };
    let last_line = name
        .rsplit(|c: char| c == '\n' || c == '\r')
        .next()
        .unwrap_or_default()
        .trim();
    last_line.len() >= 2
        && last_line.starts_with(|c: char| c.is_ascii_alphabetic())
        && last_line.chars().all(|c| c.is_ascii_alphanumeric())
}

pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
