use crate::{
    AxisType,
    error::{CloseError, ConnectError, RotctlError},
};
use log::{debug, trace, warn};
use std::{
    io,
    net::{IpAddr, Shutdown, SocketAddr},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time,
};
use tokio_util::sync::CancellationToken;

/// Size of the buffer a single reply is read into.
pub const RX_BUFFER_SIZE: usize = 8192;

/// How long to wait for a reply before giving up on a command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// How long [`AxisChannel::flush_stale`] waits for leftover bytes to show up.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(10);

/// A persistent connection to the rotator daemon driving one axis.
///
/// Commands are request/response over a single stream, so a channel carries at
/// most one command at a time (enforced by `&mut self`).
#[derive(Debug)]
pub struct AxisChannel {
    axis: AxisType,
    stream: TcpStream,
    flush_window: Duration,
}

impl AxisChannel {
    /// Connects to the daemon for `axis` at `address:port`.
    pub async fn open(axis: AxisType, address: &str, port: u16) -> Result<Self, ConnectError> {
        Self::connect(axis, address, port, None).await
    }

    /// Like [`open`](Self::open), but gives up after `limit`.
    pub async fn open_with_timeout(
        axis: AxisType,
        address: &str,
        port: u16,
        limit: Duration,
    ) -> Result<Self, ConnectError> {
        Self::connect(axis, address, port, Some(limit)).await
    }

    async fn connect(
        axis: AxisType,
        address: &str,
        port: u16,
        limit: Option<Duration>,
    ) -> Result<Self, ConnectError> {
        if axis.prefix().is_none() {
            return Err(ConnectError::InvalidAxis(axis));
        }

        let ip: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| ConnectError::InvalidAddress(address.to_string()))?;
        let remote = SocketAddr::new(ip, port);

        let connecting = TcpStream::connect(remote);
        let connected = match limit {
            Some(limit) => time::timeout(limit, connecting).await.map_err(|_| {
                ConnectError::ConnectTimeout {
                    axis,
                    address: remote.to_string(),
                }
            })?,
            None => connecting.await,
        };

        let stream = connected.map_err(|source| ConnectError::Connect {
            axis,
            address: remote.to_string(),
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not disable Nagle on {axis} channel: {e}");
        }

        debug!("opened {axis} channel to {remote}");

        Ok(Self {
            axis,
            stream,
            flush_window: DEFAULT_FLUSH_WINDOW,
        })
    }

    pub fn with_flush_window(mut self, flush_window: Duration) -> Self {
        self.flush_window = flush_window;
        self
    }

    pub fn axis(&self) -> AxisType {
        self.axis
    }

    /// Shuts both directions down and releases the socket.
    ///
    /// The channel is consumed even when this fails.
    pub fn close(self) -> Result<(), CloseError> {
        let axis = self.axis;
        let stream = self
            .stream
            .into_std()
            .map_err(|source| CloseError { axis, source })?;

        stream
            .shutdown(Shutdown::Both)
            .map_err(|source| CloseError { axis, source })?;

        debug!("closed {axis} channel");
        Ok(())
    }

    /// Discards whatever the daemon already sent, like a late reply to a
    /// command that timed out. Returns the number of bytes dropped.
    pub async fn flush_stale(&mut self) -> usize {
        match time::timeout(self.flush_window, self.stream.readable()).await {
            Ok(Ok(())) => {}
            _ => return 0,
        }

        let mut buf = [0u8; RX_BUFFER_SIZE];
        let mut flushed = 0;

        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => flushed += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("flushing {} channel failed: {e}", self.axis);
                    break;
                }
            }
        }

        if flushed > 0 {
            debug!("flushed {flushed} stale bytes from {} channel", self.axis);
        }

        flushed
    }

    /// Sends one command line and returns the first chunk of the reply.
    ///
    /// Waiting for the reply is bounded by `timeout` and by `cancel`.
    pub async fn send_command(
        &mut self,
        line: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RotctlError> {
        let axis = self.axis;

        self.flush_stale().await;

        trace!("{axis} <- {:?}", line.trim_end());

        let written = tokio::select! {
            _ = cancel.cancelled() => return Err(RotctlError::Cancelled),
            written = time::timeout(timeout, self.stream.write_all(line.as_bytes())) => written,
        };

        match written {
            Err(_) => return Err(RotctlError::Timeout { axis, after: timeout }),
            Ok(Err(source)) => return Err(RotctlError::Io { axis, source }),
            Ok(Ok(())) => {}
        }

        let mut buf = vec![0u8; RX_BUFFER_SIZE];

        let read = tokio::select! {
            _ = cancel.cancelled() => return Err(RotctlError::Cancelled),
            read = time::timeout(timeout, self.stream.read(&mut buf)) => read,
        };

        match read {
            Err(_) => {
                warn!("no reply on {axis} channel after {timeout:?}");
                Err(RotctlError::Timeout { axis, after: timeout })
            }
            Ok(Err(source)) => Err(RotctlError::Io { axis, source }),
            Ok(Ok(0)) => Err(RotctlError::Io {
                axis,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "rotator daemon closed the connection",
                ),
            }),
            Ok(Ok(n)) => {
                buf.truncate(n);
                trace!("{axis} -> {:?}", String::from_utf8_lossy(&buf).trim_end());
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOptions, MockRotctld, StalledListener};
    use tokio::{net::TcpListener, time::Instant};

    #[tokio::test]
    async fn rejects_bad_address() {
        let err = AxisChannel::open(AxisType::Azimuth, "not-an-ip", 4533)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectError::InvalidAddress(addr) if addr == "not-an-ip"));
    }

    #[tokio::test]
    async fn rejects_missing_axis() {
        let err = AxisChannel::open(AxisType::None, "127.0.0.1", 4533)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectError::InvalidAxis(AxisType::None)));
    }

    #[tokio::test]
    async fn reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = AxisChannel::open(AxisType::Elevation, "127.0.0.1", port)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConnectError::Connect {
                axis: AxisType::Elevation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn connecting_gives_up_after_the_limit() {
        let stalled = StalledListener::start().await.unwrap();

        let started = Instant::now();
        let err = AxisChannel::open_with_timeout(
            AxisType::Azimuth,
            "127.0.0.1",
            stalled.port(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ConnectError::ConnectTimeout {
                axis: AxisType::Azimuth,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn silent_daemon_times_out_within_bound() {
        let daemon = MockRotctld::start(AxisType::Azimuth, MockOptions::silent())
            .await
            .unwrap();
        let mut channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", daemon.port())
            .await
            .unwrap();

        let bound = Duration::from_millis(200);
        let started = Instant::now();
        let result = channel
            .send_command("w A10.00\n", bound, &CancellationToken::new())
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            Err(RotctlError::Timeout { axis: AxisType::Azimuth, after }) if after == bound
        ));
        assert!(elapsed >= bound, "returned after {elapsed:?}");
        assert!(elapsed < bound + Duration::from_millis(250), "returned after {elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_wait() {
        let daemon = MockRotctld::start(AxisType::Azimuth, MockOptions::silent())
            .await
            .unwrap();
        let mut channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", daemon.port())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = channel
            .send_command("w A10.00\n", DEFAULT_COMMAND_TIMEOUT, &cancel)
            .await;

        assert!(matches!(result, Err(RotctlError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stale_bytes_are_flushed_before_the_next_command() {
        let options = MockOptions {
            greeting: Some("E=99.00 RPRT 0\n".to_string()),
            ..MockOptions::default()
        };
        let daemon = MockRotctld::start(AxisType::Elevation, options).await.unwrap();
        let mut channel = AxisChannel::open(AxisType::Elevation, "127.0.0.1", daemon.port())
            .await
            .unwrap();

        // Give the unsolicited line time to land in the socket buffer.
        time::sleep(Duration::from_millis(50)).await;

        let reply = channel
            .send_command("w E\n", Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();
        let reply = String::from_utf8_lossy(&reply);

        assert!(!reply.contains("99.00"), "stale reply leaked: {reply:?}");
        assert!(reply.starts_with("E=0.00"), "unexpected reply: {reply:?}");
    }

    #[tokio::test]
    async fn flush_without_pending_data_is_a_no_op() {
        let daemon = MockRotctld::start(AxisType::Azimuth, MockOptions::default())
            .await
            .unwrap();
        let mut channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", daemon.port())
            .await
            .unwrap();

        assert_eq!(channel.flush_stale().await, 0);
    }

    #[tokio::test]
    async fn flush_stops_at_end_of_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut channel = AxisChannel::open(AxisType::Elevation, "127.0.0.1", port)
            .await
            .unwrap();
        peer.await.unwrap();
        time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        assert_eq!(channel.flush_stale().await, 0);
        assert_eq!(channel.flush_stale().await, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn closing_a_reset_connection_fails_but_consumes_it() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Dropping with a zero linger sends RST instead of FIN.
            #[allow(deprecated)]
            socket.set_linger(Some(Duration::ZERO)).unwrap();
            drop(socket);
        });

        let channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", port)
            .await
            .unwrap();
        assert_eq!(channel.axis(), AxisType::Azimuth);
        peer.await.unwrap();
        time::sleep(Duration::from_millis(100)).await;

        let err = channel.close().unwrap_err();

        assert_eq!(err.axis, AxisType::Azimuth);
    }

    #[tokio::test]
    async fn closed_daemon_is_an_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_millis(100)).await;
            drop(socket);
        });

        let mut channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", port)
            .await
            .unwrap();
        let result = channel
            .send_command("w A\n", Duration::from_secs(2), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RotctlError::Io { axis: AxisType::Azimuth, .. })));
    }

    #[tokio::test]
    async fn close_shuts_the_connection_down() {
        let daemon = MockRotctld::start(AxisType::Azimuth, MockOptions::default())
            .await
            .unwrap();
        let channel = AxisChannel::open(AxisType::Azimuth, "127.0.0.1", daemon.port())
            .await
            .unwrap();

        assert!(daemon.wait_for_connections(1, Duration::from_secs(1)).await);
        channel.close().unwrap();
        assert!(daemon.wait_for_connections(0, Duration::from_secs(1)).await);
    }
}
