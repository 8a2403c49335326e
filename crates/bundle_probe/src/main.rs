//! Bundle probe: establish one logical connection and report how it ended.
//!
//! The probe is the caller of the handshake. It owns the deadline and the
//! reaction to termination signals, and tears the connection down by
//! dropping it.

mod cli;
mod config;
mod logging;
mod report;

use anyhow::{anyhow, Result};
use socket_bundle::{ChannelHandler, ConnectAndHandshake, LogicalConnection, TcpTransport};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use cli::CliArgs;
use config::AppConfig;
use logging::setup_logging;
use report::{ProbeOutcome, ProbeReport};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(args).await {
        Ok(report) if report.outcome.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("❌ Probe error: {e:#}");
            eprintln!("bundle_probe: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<ProbeReport> {
    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_cli(&args)?;
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    setup_logging(&config.logging)?;

    let peer = format!("{}:{}", config.probe.host, config.probe.service);
    let deadline = Duration::from_secs(config.probe.timeout_secs);

    let (handler, mut events) = ChannelHandler::new();
    let (connection, _inbound) = LogicalConnection::new(config.stream.clone(), handler)?;
    info!(
        "🚀 Probing {} with {} socket(s), session {}",
        peer,
        connection.socket_count(),
        connection.token()
    );

    let started = Instant::now();
    let driver = ConnectAndHandshake::start(
        &connection,
        Arc::new(TcpTransport),
        config.probe.host.clone(),
        config.probe.service.clone(),
    );

    let outcome = tokio::select! {
        event = events.recv() => match event {
            Some(event) => ProbeOutcome::from(event),
            None => return Err(anyhow!("connection handler closed without an event")),
        },
        _ = tokio::time::sleep(deadline) => {
            warn!("⏱️ No outcome after {}s, tearing down", deadline.as_secs());
            ProbeOutcome::TimedOut
        }
        signal = termination_signal() => {
            warn!("📡 Received {}, tearing down", signal?);
            ProbeOutcome::Interrupted
        }
    };

    let report = ProbeReport::capture(&connection, peer, outcome, started.elapsed());
    match &report.outcome {
        ProbeOutcome::Connected => info!("✅ Connected in {}ms", report.elapsed_ms),
        ProbeOutcome::Failed { slot, reason } => warn!("❌ Socket {slot} failed: {reason}"),
        ProbeOutcome::TimedOut | ProbeOutcome::Interrupted => {}
    }

    drop(connection);
    if let Err(e) = driver.await {
        warn!("Handshake driver ended abnormally: {e}");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

/// Resolves with the signal's name once the process is asked to stop.
async fn termination_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => interrupted.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}
