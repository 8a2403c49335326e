//! Configuration for logical connections.
//!
//! [`BundleConfig`] can be embedded in a TOML file through serde, or built
//! from the compact stream option string form used on command lines:
//!
//! ```text
//! --send-buffer-size=32768 --parallel-sockets=1 --no-delay=true
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{ProtocolVariant, DEFAULT_MAX_HEADER_SIZE, STATUS_LINE, TERMINATOR};

fn default_socket_count() -> usize {
    1
}

fn default_no_delay() -> bool {
    true
}

fn default_send_buffer_size() -> usize {
    32768
}

fn default_max_header_size() -> usize {
    DEFAULT_MAX_HEADER_SIZE
}

/// Settings shared by every socket of one logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Number of physical sockets making up the logical connection
    #[serde(default = "default_socket_count")]
    pub socket_count: usize,

    /// Handshake variant negotiated for the stream type
    #[serde(default)]
    pub variant: ProtocolVariant,

    /// Whether to disable Nagle's algorithm on each socket
    #[serde(default = "default_no_delay")]
    pub no_delay: bool,

    /// Kernel send buffer size in bytes (0 keeps the OS default)
    #[serde(default = "default_send_buffer_size")]
    pub send_buffer_size: usize,

    /// Upper bound on bytes read while waiting for the handshake response
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,

    /// Only connect to IPv4 candidates
    #[serde(default)]
    pub ipv4_only: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            socket_count: default_socket_count(),
            variant: ProtocolVariant::default(),
            no_delay: default_no_delay(),
            send_buffer_size: default_send_buffer_size(),
            max_header_size: default_max_header_size(),
            ipv4_only: false,
        }
    }
}

impl BundleConfig {
    /// Smallest header buffer able to hold the status line and terminator.
    pub const MIN_HEADER_SIZE: usize = STATUS_LINE.len() + TERMINATOR.len();

    /// Largest header buffer a socket may read into.
    pub const MAX_HEADER_SIZE: usize = 64 * 1024;

    /// Builds a configuration from a `--key=value` option string.
    ///
    /// Unset keys keep their defaults. Recognised keys are
    /// `parallel-sockets`, `no-delay`, `send-buffer-size`,
    /// `max-header-size`, `websocket-version` (`13` or `legacy`) and
    /// `ipv4-only`.
    pub fn from_options_string(options: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_options(options)?;
        Ok(config)
    }

    /// Applies a `--key=value` option string on top of the current values.
    ///
    /// Nothing is changed unless every option parses and the result is valid.
    pub fn apply_options(&mut self, options: &str) -> Result<(), ConfigError> {
        let mut config = self.clone();
        for option in options.split_whitespace() {
            let Some(option) = option.strip_prefix("--") else {
                return Err(ConfigError::UnknownOption(option.to_string()));
            };
            let (key, value) = option.split_once('=').unwrap_or((option, "true"));
            match key {
                "parallel-sockets" => config.socket_count = parse_value(key, value)?,
                "no-delay" => config.no_delay = parse_value(key, value)?,
                "send-buffer-size" => config.send_buffer_size = parse_value(key, value)?,
                "max-header-size" => config.max_header_size = parse_value(key, value)?,
                "ipv4-only" => config.ipv4_only = parse_value(key, value)?,
                "websocket-version" => {
                    config.variant = match value {
                        "13" => ProtocolVariant::Versioned,
                        "legacy" | "76" => ProtocolVariant::Legacy,
                        _ => return Err(invalid(key, value)),
                    }
                }
                _ => return Err(ConfigError::UnknownOption(key.to_string())),
            }
        }
        config.validate()?;
        *self = config;
        Ok(())
    }

    /// Checks the configuration for values the handshake cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_count == 0 {
            return Err(ConfigError::NoSockets);
        }
        if self.max_header_size < Self::MIN_HEADER_SIZE {
            return Err(ConfigError::HeaderBufferTooSmall {
                actual: self.max_header_size,
                minimum: Self::MIN_HEADER_SIZE,
            });
        }
        if self.max_header_size > Self::MAX_HEADER_SIZE {
            return Err(ConfigError::HeaderBufferTooLarge {
                actual: self.max_header_size,
                maximum: Self::MAX_HEADER_SIZE,
            });
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: key.to_string(),
        value: value.to_string(),
    }
}
