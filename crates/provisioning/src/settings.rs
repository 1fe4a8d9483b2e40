//! Provisioning inputs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rtkbridge_receiver::DataOutputConfig;

use crate::STEP_DELAY;
use crate::error::ProvisioningError;

/// Role of the receiver's built-in NTRIP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NtripMode {
    #[default]
    Client,
    Server,
}

impl fmt::Display for NtripMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtripMode::Client => write!(f, "Client"),
            NtripMode::Server => write!(f, "Server"),
        }
    }
}

impl FromStr for NtripMode {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(NtripMode::Client),
            "server" => Ok(NtripMode::Server),
            other => Err(ProvisioningError::InvalidSettings(format!(
                "unknown NTRIP mode {other:?} (expected Client or Server)"
            ))),
        }
    }
}

/// Arguments of the receiver's `setNTRIPSettings` command.
#[derive(Clone, PartialEq, Eq)]
pub struct NtripSettings {
    /// Receiver-side connection slot, e.g. `NTR1`.
    pub connection: String,
    pub mode: NtripMode,
    pub caster: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mountpoint: String,
}

impl NtripSettings {
    pub fn command(&self) -> String {
        format!(
            "setNTRIPSettings,{},{},{},{},{},{},{}",
            self.connection,
            self.mode,
            self.caster,
            self.port,
            self.username,
            self.password,
            self.mountpoint
        )
    }

    /// Re-query of the same connection slot.
    pub fn query_command(&self) -> String {
        rtkbridge_receiver::commands::get_ntrip_settings(&self.connection)
    }

    /// Rejects values that cannot be expressed as command arguments.
    pub fn validate(&self) -> Result<(), ProvisioningError> {
        for (name, value) in [
            ("connection", &self.connection),
            ("caster", &self.caster),
            ("mountpoint", &self.mountpoint),
        ] {
            if value.trim().is_empty() {
                return Err(ProvisioningError::InvalidSettings(format!("{name} is empty")));
            }
        }
        for (name, value) in [
            ("connection", &self.connection),
            ("caster", &self.caster),
            ("username", &self.username),
            ("password", &self.password),
            ("mountpoint", &self.mountpoint),
        ] {
            if value.contains([',', '\r', '\n']) {
                return Err(ProvisioningError::InvalidSettings(format!(
                    "{name} must not contain commas or line breaks"
                )));
            }
        }
        if self.port == 0 {
            return Err(ProvisioningError::InvalidSettings("port is 0".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for NtripSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtripSettings")
            .field("connection", &self.connection)
            .field("mode", &self.mode)
            .field("caster", &self.caster)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mountpoint", &self.mountpoint)
            .finish()
    }
}

/// Receiver user account, when its command interface is protected.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceiverLogin {
    pub username: String,
    pub password: String,
}

impl ReceiverLogin {
    /// `None` unless both fields are non-empty.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for ReceiverLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one provisioning run needs.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub ntrip: NtripSettings,
    pub login: Option<ReceiverLogin>,
    pub output: DataOutputConfig,
    pub step_delay: Duration,
}

impl ProvisioningConfig {
    pub fn new(ntrip: NtripSettings) -> Self {
        Self {
            ntrip,
            login: None,
            output: DataOutputConfig::default(),
            step_delay: STEP_DELAY,
        }
    }

    pub fn with_login(mut self, login: Option<ReceiverLogin>) -> Self {
        self.login = login;
        self
    }

    pub fn with_output(mut self, output: DataOutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }
}
