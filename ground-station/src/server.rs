//! Newline-delimited JSON requests over TCP.

use crate::{
    observation::Station,
    requests::{Request, Response},
};
use log::{debug, error, info, warn};
use sdr::ProcessControl;
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;

/// Accepts clients until `cancel` fires. Each client is served on its own task.
pub async fn serve<P>(listener: TcpListener, station: Arc<Station<P>>, cancel: CancellationToken)
where
    P: ProcessControl + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("listening for requests on {addr}");
    }

    loop {
        let accept = tokio::select! {
            accept = listener.accept() => accept,
            () = cancel.cancelled() => break,
        };

        match accept {
            Ok((socket, peer)) => {
                debug!("client {peer} connected");
                let station = Arc::clone(&station);
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    match handle_connection(socket, &station, &cancel).await {
                        Ok(()) => debug!("client {peer} disconnected"),
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                            ) =>
                        {
                            debug!("client {peer} went away");
                        }
                        Err(e) => warn!("closing connection to {peer}: {e}"),
                    }
                });
            }
            Err(e) => error!("failed to accept connection: {e}"),
        }
    }

    info!("request listener stopped");
}

async fn handle_connection<P: ProcessControl>(
    socket: TcpStream,
    station: &Station<P>,
    cancel: &CancellationToken,
) -> io::Result<()> {
    let (rx, mut tx) = socket.into_split();
    let mut lines = BufReader::new(rx).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = cancel.cancelled() => break,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => station.handle(request).await,
            Err(e) => Response::error(format!("invalid request: {e}")),
        };

        let mut encoded = serde_json::to_vec(&response).map_err(io::Error::other)?;
        encoded.push(b'\n');
        tx.write_all(&encoded).await?;
    }

    tx.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::tests::station;
    use antenna_controller::{
        AxisType,
        mock::{MockOptions, MockRotctld},
    };
    use sdr::mock::MockProcess;
    use serde_json::Value;
    use tokio::{
        io::Lines,
        net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    };

    async fn exchange(
        lines: &mut Lines<BufReader<OwnedReadHalf>>,
        tx: &mut OwnedWriteHalf,
        request: &str,
    ) -> Value {
        tx.write_all(format!("{request}\n").as_bytes()).await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn requests_round_trip_over_tcp() {
        let az = MockRotctld::start(AxisType::Azimuth, MockOptions::default())
            .await
            .unwrap();
        let el = MockRotctld::start(AxisType::Elevation, MockOptions::default())
            .await
            .unwrap();
        let station = Arc::new(station(&az, &el, MockProcess::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, Arc::clone(&station), cancel.clone()));

        let (rx, mut tx) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(rx).lines();

        let opened = exchange(&mut lines, &mut tx, r#"{"command":"open"}"#).await;
        assert_eq!(opened, serde_json::json!({"status": "ok"}));

        let moved = exchange(
            &mut lines,
            &mut tx,
            r#"{"command":"move","azimuth":180.0,"elevation":45.0}"#,
        )
        .await;
        assert_eq!(moved["status"], "ok");
        assert_eq!(moved["azimuth"], 180.0);

        let invalid = exchange(&mut lines, &mut tx, "not json").await;
        assert_eq!(invalid["status"], "error");
        assert!(invalid["message"].as_str().unwrap().starts_with("invalid request"));

        let status = exchange(&mut lines, &mut tx, r#"{"command":"status"}"#).await;
        assert_eq!(status["elevation"], 45.0);
        assert_eq!(status["observation_open"], true);

        cancel.cancel();
        server.await.unwrap();
        assert!(lines.next_line().await.unwrap().is_none());

        station.shutdown().await;
        assert!(az.wait_for_connections(0, std::time::Duration::from_secs(2)).await);
    }
}
