//! One probe run: connect, issue a call, collect pushes, shut down.

use crate::args::ProbeArgs;
use crate::error::ProbeError;

use bridge_core::{Bridge, BridgeConfig, CallOptions, ConnectionState, Transport, WebSocketTransport};

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

const APP_DIR_NAME: &str = "bridge-probe";

/// What the host sent back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub reply: Value,
    /// Pushes on watched topics, in arrival order.
    pub pushes: Vec<(String, Value)>,
}

/// Run the probe against the WebSocket URL named in `args`.
///
/// # Errors
///
/// See [`run_with`]; additionally fails if the URL is not a WebSocket URL.
pub async fn run(args: &ProbeArgs, config: BridgeConfig) -> Result<ProbeOutcome, ProbeError> {
    let transport = WebSocketTransport::parse(&args.url)?;
    run_with(transport, args, config).await
}

/// Run the probe over any transport.
///
/// # Errors
///
/// - [`ProbeError::Connect`] if the host is not reached within the connect timeout
/// - [`ProbeError::Call`] if the call fails
pub async fn run_with(
    transport: impl Transport + 'static,
    args: &ProbeArgs,
    config: BridgeConfig,
) -> Result<ProbeOutcome, ProbeError> {
    let connect_timeout = config.transport.connect_timeout();
    let bridge = Bridge::start(transport, config);

    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    let subscriptions: Vec<_> = args
        .watch
        .iter()
        .map(|topic| {
            let tx = push_tx.clone();
            let name = topic.clone();
            bridge.subscribe(topic.as_str(), move |payload| {
                let _ = tx.send((name.clone(), payload.clone()));
            })
        })
        .collect();
    drop(push_tx);

    let outcome = call_when_connected(&bridge, args, connect_timeout).await;

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    bridge.shutdown().await;

    let reply = outcome?;
    let mut pushes = Vec::new();
    while let Ok(push) = push_rx.try_recv() {
        pushes.push(push);
    }

    debug!("Collected {} push(es)", pushes.len());
    Ok(ProbeOutcome { reply, pushes })
}

async fn call_when_connected(
    bridge: &Bridge,
    args: &ProbeArgs,
    connect_timeout: std::time::Duration,
) -> Result<Value, ProbeError> {
    timeout(
        connect_timeout,
        bridge.wait_for_state(ConnectionState::Connected),
    )
    .await
    .map_err(|_| ProbeError::Connect {
        message: format!("Host not reachable within {connect_timeout:?}"),
        location: ErrorLocation::from(Location::caller()),
    })??;

    info!("Calling {}", args.method);
    let reply = bridge
        .call(args.method.as_str(), args.params.clone(), CallOptions::new())
        .await?;
    Ok(reply)
}

/// `<config dir>/bridge-probe`, holding `bridge.toml`.
///
/// # Errors
///
/// Returns [`ProbeError::Probe`] if the platform has no config directory.
pub fn config_dir() -> Result<PathBuf, ProbeError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| ProbeError::Probe {
            message: "No user config directory on this platform".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// `<data dir>/bridge-probe/logs`.
///
/// # Errors
///
/// Returns [`ProbeError::Probe`] if the platform has no data directory.
pub fn log_dir() -> Result<PathBuf, ProbeError> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
        .ok_or_else(|| ProbeError::Probe {
            message: "No user data directory on this platform".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
}
