//! Configuration management for the bundle probe.
//!
//! Settings come from a TOML file (created with defaults when missing) and
//! are then overridden by command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use socket_bundle::BundleConfig;
use std::path::Path;
use tracing::info;

use crate::cli::CliArgs;

fn default_timeout_secs() -> u64 {
    10
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which peer to probe and for how long
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Logical connection settings
    #[serde(default)]
    pub stream: BundleConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Target peer and the external deadline for the attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Peer host name or address
    pub host: String,
    /// Peer service; must be a numeric port for TCP
    pub service: String,
    /// Seconds to wait for the terminal event before tearing down
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            service: "7777".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to that
    /// path and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file values.
    ///
    /// Stream options are applied before `--sockets`, so an explicit socket
    /// count always wins.
    pub fn apply_cli(&mut self, args: &CliArgs) -> Result<()> {
        if let Some(host) = &args.host {
            self.probe.host = host.clone();
        }
        if let Some(service) = &args.service {
            self.probe.service = service.clone();
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.probe.timeout_secs = timeout_secs;
        }
        if let Some(options) = &args.stream_options {
            self.stream
                .apply_options(options)
                .context("invalid stream options")?;
        }
        if let Some(sockets) = args.sockets {
            self.stream.socket_count = sockets;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        Ok(())
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.probe.host.trim().is_empty() {
            return Err("Probe host cannot be empty".to_string());
        }

        if self.probe.service.parse::<u16>().is_err() {
            return Err(format!(
                "Invalid service: {}. Must be a numeric port",
                &self.probe.service
            ));
        }

        if self.probe.timeout_secs == 0 {
            return Err("Probe timeout must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.stream
            .validate()
            .map_err(|e| format!("Invalid stream settings: {e}"))
    }
}
