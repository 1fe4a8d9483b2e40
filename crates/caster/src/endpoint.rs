//! Caster address and credentials.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};

/// Where to fetch corrections from and how to authenticate.
///
/// Immutable once built; a [`CasterSession`](crate::CasterSession) owns its
/// endpoint for its whole lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct CasterEndpoint {
    host: String,
    port: u16,
    mountpoint: String,
    username: String,
    password: String,
}

impl CasterEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        mountpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mountpoint: String = mountpoint.into();
        Self {
            host: host.into(),
            port,
            mountpoint: mountpoint.trim_start_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base64 of `username:password` for the Basic authorization header.
    pub fn authorization(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl fmt::Debug for CasterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CasterEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mountpoint", &self.mountpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for CasterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.mountpoint)
    }
}
