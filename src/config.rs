//! Client configuration.
//!
//! Connection parameters are supplied by the embedding application (which
//! owns persistence); this module only defines the structure, defaults
//! and validation.

use serde::Deserialize;
use weerelay_proto::{Compression, SessionConfig};

use crate::error::{ClientError, ClientResult};

fn default_port() -> u16 {
    9000
}

fn default_history_lines() -> u32 {
    50
}

fn default_compression() -> Compression {
    Compression::Zlib
}

/// Relay connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Relay host name or address.
    pub host: String,
    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wrap the connection in TLS.
    #[serde(default)]
    pub tls: bool,
    /// Relay password.
    #[serde(default)]
    pub password: Option<String>,
    /// One-time password, when the relay requires TOTP.
    #[serde(default)]
    pub totp: Option<String>,
    /// Frame compression to negotiate.
    #[serde(default = "default_compression")]
    pub compression: Compression,
    /// Number of backlog lines fetched per buffer on sync.
    #[serde(default = "default_history_lines")]
    pub history_lines: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            host: String::new(),
            port: default_port(),
            tls: false,
            password: None,
            totp: None,
            compression: default_compression(),
            history_lines: default_history_lines(),
        }
    }
}

impl RelayConfig {
    /// Validate the configuration before connecting.
    pub fn validate(&self) -> ClientResult<()> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host is required".to_string()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port is required".to_string()));
        }
        if self.history_lines == 0 {
            return Err(ClientError::Config(
                "history_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The `host:port` dial address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Derive the session machine configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            password: self.password.clone(),
            totp: self.totp.clone(),
            compression: self.compression,
            history_lines: self.history_lines,
        }
    }
}
