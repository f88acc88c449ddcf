use crate::error::TunerError;
use log::{debug, warn};
use std::{net::SocketAddr, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream, time};
use tokio_util::sync::CancellationToken;

/// Tunes the SDR server to `frequency_hz`.
///
/// The server may not be up yet, so connecting is retried every `retry` until
/// it succeeds or `cancel` fires.
pub async fn set_frequency(
    address: SocketAddr,
    frequency_hz: u64,
    retry: Duration,
    cancel: &CancellationToken,
) -> Result<(), TunerError> {
    let mut stream = loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return Err(TunerError::Cancelled),
            attempt = TcpStream::connect(address) => attempt,
        };

        match attempt {
            Ok(stream) => break stream,
            Err(e) => warn!("SDR server at {address} unreachable ({e}), retrying in {retry:?}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(TunerError::Cancelled),
            _ = time::sleep(retry) => {}
        }
    };

    stream.write_all(frequency_hz.to_string().as_bytes()).await?;
    stream.shutdown().await?;

    debug!("SDR tuned to {frequency_hz} Hz");
    Ok(())
}
