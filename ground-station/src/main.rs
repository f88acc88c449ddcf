mod cli;
mod config;
mod logging;
mod observation;
mod requests;
mod server;

use crate::{cli::Args, config::Config, observation::Station};
use anyhow::Context;
use antenna_controller::SharedPosition;
use clap::Parser;
use log::{info, warn};
use sdr::CaptureSupervisor;
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args)
        .with_context(|| format!("failed to load configuration from `{}`", args.config))?;

    logging::init(config.log.verbosity, config.log.file.as_deref())
        .context("failed to initialise logging")?;

    info!(
        "rotator at {} (azimuth port {}, elevation port {})",
        config.rotator.address, config.rotator.azimuth_port, config.rotator.elevation_port
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let listen_address = config.listen_address();
    let listener = TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("failed to listen on {listen_address}"))?;

    let capture = CaptureSupervisor::new(config.capture.settings());
    let station = Arc::new(Station::new(
        config,
        SharedPosition::new(),
        capture,
        cancel.clone(),
    ));

    server::serve(listener, Arc::clone(&station), cancel).await;

    station.shutdown().await;
    info!("ground station stopped");

    Ok(())
}

/// Cancels `cancel` on the first SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => Some(terminate),
        Err(e) => {
            warn!("cannot listen for SIGTERM: {e}");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("cannot listen for SIGINT: {e}");
                return;
            }
            info!("received SIGINT, shutting down");
        }
        Some(()) = async {
            match terminate.as_mut() {
                Some(terminate) => terminate.recv().await,
                None => std::future::pending().await,
            }
        } => {
            info!("received SIGTERM, shutting down");
        }
    }

    cancel.cancel();
}
