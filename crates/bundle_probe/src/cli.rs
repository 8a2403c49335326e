//! Command-line interface for the bundle probe.
//!
//! Every option here overrides the matching value from the configuration
//! file; anything left unset falls through to the file or its defaults.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Peer host name or address
    pub host: Option<String>,
    /// Peer service (numeric port)
    pub service: Option<String>,
    /// Number of sockets in the logical connection
    pub sockets: Option<usize>,
    /// Stream options in `--key=value` form, applied on top of the file
    pub stream_options: Option<String>,
    /// Seconds to wait for the terminal event
    pub timeout_secs: Option<u64>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    ///
    /// # Returns
    ///
    /// A `CliArgs` instance; clap exits the process on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("probe.toml")),
            host: matches.get_one::<String>("host").cloned(),
            service: matches.get_one::<String>("service").cloned(),
            sockets: matches.get_one::<usize>("sockets").copied(),
            stream_options: matches.get_one::<String>("stream-options").cloned(),
            timeout_secs: matches.get_one::<u64>("timeout").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("Bundle Probe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Establishes one multi-socket logical connection and reports the outcome")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("probe.toml"),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("HOST")
                .help("Peer host name or address"),
        )
        .arg(
            Arg::new("service")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Peer port"),
        )
        .arg(
            Arg::new("sockets")
                .short('n')
                .long("sockets")
                .value_name("COUNT")
                .help("Number of physical sockets")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("stream-options")
                .short('o')
                .long("stream-options")
                .value_name("OPTIONS")
                .help("Stream options, e.g. \"--websocket-version=legacy --no-delay=false\"")
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECONDS")
                .help("Give up after this many seconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse_from(&["bundle_probe"]);
        assert_eq!(args.config_path, PathBuf::from("probe.toml"));
        assert!(args.host.is_none());
        assert!(args.sockets.is_none());
        assert!(args.timeout_secs.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = parse_from(&[
            "bundle_probe",
            "-c",
            "custom.toml",
            "--host",
            "sim.example.org",
            "--port",
            "7777",
            "-n",
            "4",
            "--stream-options",
            "--websocket-version=legacy",
            "--timeout",
            "3",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.host.as_deref(), Some("sim.example.org"));
        assert_eq!(args.service.as_deref(), Some("7777"));
        assert_eq!(args.sockets, Some(4));
        assert_eq!(
            args.stream_options.as_deref(),
            Some("--websocket-version=legacy")
        );
        assert_eq!(args.timeout_secs, Some(3));
        assert!(args.json_logs);
    }

    #[test]
    fn test_rejects_non_numeric_socket_count() {
        assert!(command()
            .try_get_matches_from(["bundle_probe", "--sockets", "many"])
            .is_err());
    }
}
