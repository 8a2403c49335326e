//! Logging system setup.
//!
//! `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so that stdout carries only the probe report.
///
/// # Arguments
/// * `settings` - Level filter and output format
///
/// # Returns
/// * `Result<()>` - Error if a global subscriber is already installed
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let registry = tracing_subscriber::registry().with(filter);

    if settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", settings.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup_only_once() {
        let settings = LoggingSettings::default();

        // Only one global subscriber may be installed per process
        let _ = setup_logging(&settings);
        assert!(setup_logging(&settings).is_err());
    }
}
