//! Bridge configuration.
//!
//! Sources, lowest to highest precedence:
//! - built-in defaults
//! - a JSON file named by `RTKBRIDGE_CONFIG` (camelCase keys)
//! - environment variables (`NTRIP_CASTER`, `UART_DEVICE`, ...)

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use rtkbridge_caster::CasterEndpoint;
use rtkbridge_provisioning::{NtripMode, NtripSettings, ProvisioningConfig, ReceiverLogin};
use rtkbridge_receiver::{ReceiverEndpoint, endpoint::DEFAULT_BAUD_RATE};
use rtkbridge_relay::RelayConfig;

/// Environment variable naming the optional JSON config file.
pub const CONFIG_FILE_VAR: &str = "RTKBRIDGE_CONFIG";

/// What the process does after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Relay corrections until stopped.
    #[default]
    Stream,
    /// Provision the receiver once and exit.
    Config,
}

impl FromStr for OperationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(OperationMode::Stream),
            "config" => Ok(OperationMode::Config),
            other => bail!("unknown operation mode {other:?} (expected stream or config)"),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Stream => f.write_str("stream"),
            OperationMode::Config => f.write_str("config"),
        }
    }
}

/// On-disk format. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    operation_mode: Option<OperationMode>,
    caster: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    mountpoint: Option<String>,
    uart_device: Option<String>,
    uart_baudrate: Option<u32>,
    receiver_ntrip_mode: Option<String>,
    receiver_connection: Option<String>,
    receiver_username: Option<String>,
    receiver_password: Option<String>,
    gga_interval_secs: Option<u64>,
    reconnect_delay_secs: Option<u64>,
    stall_timeout_secs: Option<u64>,
}

/// Fully resolved bridge configuration.
#[derive(Clone)]
pub struct BridgeConfig {
    pub mode: OperationMode,
    pub caster: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mountpoint: String,
    pub uart_device: String,
    pub uart_baudrate: u32,
    pub receiver_ntrip_mode: NtripMode,
    pub receiver_connection: String,
    pub receiver_username: String,
    pub receiver_password: String,
    /// `None` disables position uploads.
    pub gga_interval: Option<Duration>,
    pub reconnect_delay: Duration,
    pub stall_timeout: Duration,
}

impl BridgeConfig {
    /// Loads from the process environment and the optional config file.
    pub fn load() -> anyhow::Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).ok().filter(|p| !p.is_empty());
        Self::from_sources(file.as_deref().map(Path::new), |key| std::env::var(key).ok())
    }

    /// Resolves a configuration from an optional file and an environment
    /// lookup.
    pub fn from_sources(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file = match file {
            Some(path) => read_file(path)?,
            None => ConfigFile::default(),
        };
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &'static str, from_file: Option<String>| {
            let value = env(key).or(from_file).filter(|v| !v.is_empty());
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };
        let caster = required("NTRIP_CASTER", file.caster);
        let username = required("NTRIP_USERNAME", file.username);
        let password = required("NTRIP_PASSWORD", file.password);
        let mountpoint = required("NTRIP_MOUNTPOINT", file.mountpoint);
        if !missing.is_empty() {
            bail!("missing required configuration: {}", missing.join(", "));
        }

        let mode = match env("OPERATION_MODE") {
            Some(v) => v.parse::<OperationMode>().context("OPERATION_MODE")?,
            None => file.operation_mode.unwrap_or_default(),
        };
        let receiver_ntrip_mode = env("MOSAIC_NTRIP_MODE")
            .or(file.receiver_ntrip_mode)
            .map(|v| v.parse::<NtripMode>())
            .transpose()
            .context("MOSAIC_NTRIP_MODE")?
            .unwrap_or_default();

        let gga_interval_secs = parsed(&env, "GGA_INTERVAL_SECS")?
            .or(file.gga_interval_secs)
            .unwrap_or(5);

        let config = Self {
            mode,
            caster,
            port: parsed(&env, "NTRIP_PORT")?.or(file.port).unwrap_or(2101),
            username,
            password,
            mountpoint,
            uart_device: env("UART_DEVICE")
                .or(file.uart_device)
                .unwrap_or_else(|| "/dev/ttyUSB0".into()),
            uart_baudrate: parsed(&env, "UART_BAUDRATE")?
                .or(file.uart_baudrate)
                .unwrap_or(DEFAULT_BAUD_RATE),
            receiver_ntrip_mode,
            receiver_connection: env("MOSAIC_NTRIP_CONNECTION")
                .or(file.receiver_connection)
                .unwrap_or_else(|| "NTR1".into()),
            receiver_username: env("MOSAIC_USERNAME")
                .or(file.receiver_username)
                .unwrap_or_default(),
            receiver_password: env("MOSAIC_PASSWORD")
                .or(file.receiver_password)
                .unwrap_or_default(),
            gga_interval: (gga_interval_secs > 0).then(|| Duration::from_secs(gga_interval_secs)),
            reconnect_delay: Duration::from_secs(
                parsed(&env, "RECONNECT_DELAY_SECS")?
                    .or(file.reconnect_delay_secs)
                    .unwrap_or(5),
            ),
            stall_timeout: Duration::from_secs(
                parsed(&env, "STALL_TIMEOUT_SECS")?
                    .or(file.stall_timeout_secs)
                    .unwrap_or(30),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            bail!("NTRIP_PORT must not be 0");
        }
        if self.uart_baudrate == 0 {
            bail!("UART_BAUDRATE must not be 0");
        }
        let receive_timeout = RelayConfig::default().receive_timeout;
        if self.stall_timeout <= receive_timeout {
            bail!(
                "STALL_TIMEOUT_SECS must be larger than the {}s receive timeout",
                receive_timeout.as_secs()
            );
        }
        Ok(())
    }

    pub fn caster_endpoint(&self) -> CasterEndpoint {
        CasterEndpoint::new(
            &self.caster,
            self.port,
            &self.mountpoint,
            &self.username,
            &self.password,
        )
    }

    pub fn receiver_endpoint(&self) -> ReceiverEndpoint {
        ReceiverEndpoint::new(&self.uart_device, self.uart_baudrate)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            position_interval: self.gga_interval,
            stall_threshold: self.stall_timeout,
            reconnect_delay: self.reconnect_delay,
            ..RelayConfig::default()
        }
    }

    pub fn provisioning_config(&self) -> ProvisioningConfig {
        ProvisioningConfig::new(NtripSettings {
            connection: self.receiver_connection.clone(),
            mode: self.receiver_ntrip_mode,
            caster: self.caster.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            mountpoint: self.mountpoint.clone(),
        })
        .with_login(ReceiverLogin::from_parts(
            &self.receiver_username,
            &self.receiver_password,
        ))
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("mode", &self.mode)
            .field("caster", &self.caster)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mountpoint", &self.mountpoint)
            .field("uart_device", &self.uart_device)
            .field("uart_baudrate", &self.uart_baudrate)
            .field("receiver_ntrip_mode", &self.receiver_ntrip_mode)
            .field("receiver_connection", &self.receiver_connection)
            .field("receiver_username", &self.receiver_username)
            .field("receiver_password", &"<redacted>")
            .field("gga_interval", &self.gga_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("stall_timeout", &self.stall_timeout)
            .finish()
    }
}

fn read_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let file = serde_json::from_str(&content)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config file loaded");
    Ok(file)
}

fn parsed<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("NTRIP_CASTER", "caster.example.net"),
        ("NTRIP_USERNAME", "u"),
        ("NTRIP_PASSWORD", "p"),
        ("NTRIP_MOUNTPOINT", "VRS1"),
    ];

    #[test]
    fn defaults_with_required_values() {
        let config = BridgeConfig::from_sources(None, env_of(REQUIRED)).unwrap();

        assert_eq!(config.mode, OperationMode::Stream);
        assert_eq!(config.port, 2101);
        assert_eq!(config.uart_device, "/dev/ttyUSB0");
        assert_eq!(config.uart_baudrate, 115_200);
        assert_eq!(config.receiver_ntrip_mode, NtripMode::Client);
        assert_eq!(config.receiver_connection, "NTR1");
        assert_eq!(config.gga_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.stall_timeout, Duration::from_secs(30));

        let provisioning = config.provisioning_config();
        assert!(provisioning.login.is_none());
        assert_eq!(
            provisioning.ntrip.command(),
            "setNTRIPSettings,NTR1,Client,caster.example.net,2101,u,p,VRS1"
        );
    }

    #[test]
    fn missing_values_are_reported_together() {
        let err = BridgeConfig::from_sources(None, env_of(&[("NTRIP_USERNAME", "u")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("NTRIP_CASTER"));
        assert!(err.contains("NTRIP_PASSWORD"));
        assert!(err.contains("NTRIP_MOUNTPOINT"));
        assert!(!err.contains("NTRIP_USERNAME"));
    }

    #[test]
    fn environment_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("OPERATION_MODE", "config"),
            ("NTRIP_PORT", "2102"),
            ("UART_DEVICE", "/dev/ttyAMA0"),
            ("UART_BAUDRATE", "230400"),
            ("MOSAIC_NTRIP_MODE", "server"),
            ("MOSAIC_USERNAME", "admin"),
            ("MOSAIC_PASSWORD", "secret"),
            ("GGA_INTERVAL_SECS", "0"),
            ("STALL_TIMEOUT_SECS", "45"),
        ]);
        let config = BridgeConfig::from_sources(None, env_of(&pairs)).unwrap();

        assert_eq!(config.mode, OperationMode::Config);
        assert_eq!(config.port, 2102);
        assert_eq!(config.receiver_endpoint().to_string(), "/dev/ttyAMA0 @ 230400 baud");
        assert_eq!(config.receiver_ntrip_mode, NtripMode::Server);
        assert_eq!(config.gga_interval, None);
        assert_eq!(config.relay_config().position_interval, None);
        assert_eq!(config.relay_config().stall_threshold, Duration::from_secs(45));
        assert!(config.provisioning_config().login.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let with = |key, value| {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            BridgeConfig::from_sources(None, env_of(&pairs))
        };

        assert!(with("OPERATION_MODE", "relay").is_err());
        assert!(with("NTRIP_PORT", "0").is_err());
        assert!(with("NTRIP_PORT", "http").is_err());
        assert!(with("UART_BAUDRATE", "0").is_err());
        assert!(with("MOSAIC_NTRIP_MODE", "rover").is_err());
        assert!(with("STALL_TIMEOUT_SECS", "1").is_err());

        let err = with("NTRIP_PORT", "http").unwrap_err();
        assert!(format!("{err:#}").contains("NTRIP_PORT"));
    }

    #[test]
    fn file_values_sit_between_defaults_and_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "operationMode": "config",
                "caster": "file-caster",
                "port": 2103,
                "username": "fu",
                "password": "fp",
                "mountpoint": "FILE1",
                "uartDevice": "/dev/ttyS1",
                "ggaIntervalSecs": 10
            }}"#
        )
        .unwrap();

        let config = BridgeConfig::from_sources(
            Some(file.path()),
            env_of(&[("NTRIP_CASTER", "env-caster"), ("UART_DEVICE", "")]),
        )
        .unwrap();

        assert_eq!(config.caster, "env-caster");
        assert_eq!(config.mountpoint, "FILE1");
        assert_eq!(config.port, 2103);
        assert_eq!(config.mode, OperationMode::Config);
        assert_eq!(config.uart_device, "/dev/ttyS1");
        assert_eq!(config.gga_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.caster_endpoint().to_string(), "env-caster:2103/FILE1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "casterHost": "x" }}"#).unwrap();

        let err = BridgeConfig::from_sources(Some(file.path()), env_of(REQUIRED)).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config file"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MOSAIC_PASSWORD", "hunter2"));
        let config = BridgeConfig::from_sources(None, env_of(&pairs)).unwrap();
        let text = format!("{config:?}");
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("\"p\""));
    }
}
