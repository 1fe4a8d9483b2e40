//! Receiver command vocabulary and reply classification.
//!
//! Commands are ASCII lines; the receiver answers with an echo that starts
//! with `$R:` (or `$R;` for commands that produce a block reply), and errors
//! with `$R?`. Every reply ends with a port prompt such as `COM2>`.

use crate::error::ReceiverError;

/// Prefixes of a successful reply.
pub const ACK_MARKERS: [&str; 2] = ["$R:", "$R;"];

/// Prefix of an error reply (unknown command or bad argument).
pub const INVALID_MARKER: &str = "$R?";

/// Output settings that put NMEA position sentences on the relay port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataOutputConfig {
    /// Receiver-side port the bridge is wired to.
    pub port: String,
    /// NMEA stream slot bound to the port.
    pub stream: String,
    /// Sentence list for the stream.
    pub sentences: String,
    /// Output interval keyword (`sec1`, `msec500`, ...).
    pub rate: String,
}

impl Default for DataOutputConfig {
    fn default() -> Self {
        Self {
            port: "COM2".into(),
            stream: "Stream1".into(),
            sentences: "GGA".into(),
            rate: "sec1".into(),
        }
    }
}

impl DataOutputConfig {
    /// Flags NMEA in the port's output set.
    pub fn enable_output_command(&self) -> String {
        set_data_in_out_nmea(&self.port)
    }

    /// Binds the position-sentence stream to the port at the fixed rate.
    pub fn stream_command(&self) -> String {
        format!(
            "setNMEAOutput,{},{},{},{}",
            self.stream, self.port, self.sentences, self.rate
        )
    }
}

/// Benign query used to check that the receiver answers at all.
pub fn get_com_settings(port: &str) -> String {
    format!("getCOMSettings,{port}")
}

pub fn login(username: &str, password: &str) -> String {
    format!("login,{username},{password}")
}

pub fn set_data_in_out_nmea(port: &str) -> String {
    format!("setDataInOut,{port},,+NMEA")
}

pub fn get_ntrip_settings(connection: &str) -> String {
    format!("getNTRIPSettings,{connection}")
}

/// Persists the current configuration to non-volatile storage.
pub fn write_settings() -> &'static str {
    "exeWriteSettings"
}

/// Returns `true` if the reply carries an acknowledgement marker.
pub fn is_acknowledged(reply: &str) -> bool {
    ACK_MARKERS.iter().any(|m| reply.contains(m))
}

/// Returns `true` if the reply carries the invalid-command marker.
pub fn is_invalid(reply: &str) -> bool {
    reply.contains(INVALID_MARKER)
}

/// Maps a raw reply to an outcome.
///
/// An explicit error reply is [`ReceiverError::Rejected`]; an empty reply is
/// [`ReceiverError::NoResponse`]. Anything else counts as success.
pub fn classify_response(reply: &str) -> Result<(), ReceiverError> {
    if reply.trim().is_empty() {
        return Err(ReceiverError::NoResponse);
    }
    if is_invalid(reply) {
        return Err(ReceiverError::Rejected(reply.trim().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_output_commands() {
        let cfg = DataOutputConfig::default();
        assert_eq!(cfg.enable_output_command(), "setDataInOut,COM2,,+NMEA");
        assert_eq!(cfg.stream_command(), "setNMEAOutput,Stream1,COM2,GGA,sec1");

        let cfg = DataOutputConfig {
            port: "COM3".into(),
            stream: "Stream2".into(),
            sentences: "GGA".into(),
            rate: "msec500".into(),
        };
        assert_eq!(cfg.stream_command(), "setNMEAOutput,Stream2,COM3,GGA,msec500");
    }

    #[test]
    fn simple_commands() {
        assert_eq!(get_com_settings("COM2"), "getCOMSettings,COM2");
        assert_eq!(login("admin", "pw"), "login,admin,pw");
        assert_eq!(get_ntrip_settings("NTR1"), "getNTRIPSettings,NTR1");
        assert_eq!(write_settings(), "exeWriteSettings");
    }

    #[test]
    fn classify_replies() {
        let ok = "$R: getCOMSettings,COM2\r\n  COMSettings, COM2, baud115200\r\nCOM2>";
        assert!(classify_response(ok).is_ok());
        assert!(is_acknowledged(ok));

        let block = "$R; getNTRIPSettings,NTR1\r\n  NTRIPSettings, NTR1, Client\r\nCOM2>";
        assert!(is_acknowledged(block));

        let invalid = "$R? setFoo: Invalid command!\r\nCOM2>";
        match classify_response(invalid) {
            Err(ReceiverError::Rejected(text)) => assert!(text.contains("Invalid command")),
            other => panic!("expected Rejected, got {other:?}"),
        }

        assert!(matches!(
            classify_response("  \r\n"),
            Err(ReceiverError::NoResponse)
        ));

        // Unmarked but non-empty text still counts as an answer.
        assert!(classify_response("COM2>").is_ok());
    }
}
