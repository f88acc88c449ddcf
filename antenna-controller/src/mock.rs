//! An in-process stand-in for one rotator daemon, for tests and dry runs.

use crate::AxisType;
use log::debug;
use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpSocket, TcpStream, ToSocketAddrs},
    task::JoinHandle,
    time::{self, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Acknowledge every command and report back the last position set.
    Echo,
    /// Read commands but never answer.
    Silent,
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub behaviour: Behaviour,
    /// Sent unprompted as soon as a client connects.
    pub greeting: Option<String>,
    pub reply_delay: Duration,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            behaviour: Behaviour::Echo,
            greeting: None,
            reply_delay: Duration::ZERO,
        }
    }
}

impl MockOptions {
    pub fn silent() -> Self {
        Self {
            behaviour: Behaviour::Silent,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    position: Mutex<f64>,
    received: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MockRotctld {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept: JoinHandle<()>,
}

impl MockRotctld {
    /// Starts a daemon for `axis` on an ephemeral loopback port.
    pub async fn start(axis: AxisType, options: MockOptions) -> io::Result<Self> {
        Self::bind("127.0.0.1:0", axis, options).await
    }

    pub async fn bind(
        addr: impl ToSocketAddrs,
        axis: AxisType,
        options: MockOptions,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());

        let accept = tokio::spawn(accept_loop(listener, axis, options, shared.clone()));

        Ok(Self {
            addr,
            shared,
            accept,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Last position set on this daemon.
    pub fn position(&self) -> f64 {
        *lock(&self.shared.position)
    }

    /// Every command line received so far, without the newline.
    pub fn received(&self) -> Vec<String> {
        lock(&self.shared.received).clone()
    }

    /// Currently connected clients.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_commands(&self, count: usize, limit: Duration) -> bool {
        poll_until(limit, || self.received().len() >= count).await
    }

    pub async fn wait_for_connections(&self, count: usize, limit: Duration) -> bool {
        poll_until(limit, || self.connections() == count).await
    }
}

impl Drop for MockRotctld {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

/// A loopback listener that never accepts and whose backlog is already full,
/// so further connection attempts hang in the handshake.
pub struct StalledListener {
    addr: SocketAddr,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

impl StalledListener {
    pub async fn start() -> io::Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
        let listener = socket.listen(1)?;
        let addr = listener.local_addr()?;

        let mut queued = Vec::new();
        for _ in 0..64 {
            match time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => queued.push(stream),
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        debug!("stalled listener on {addr} after {} connections", queued.len());

        Ok(Self {
            addr,
            _listener: listener,
            _queued: queued,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn poll_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;

    while Instant::now() < deadline {
        if done() {
            return true;
        }
        time::sleep(Duration::from_millis(5)).await;
    }

    done()
}

async fn accept_loop(
    listener: TcpListener,
    axis: AxisType,
    options: MockOptions,
    shared: Arc<Shared>,
) {
    while let Ok((socket, peer)) = listener.accept().await {
        debug!("mock {axis} daemon accepted {peer}");
        tokio::spawn(serve(socket, axis, options.clone(), shared.clone()));
    }
}

async fn serve(mut socket: TcpStream, axis: AxisType, options: MockOptions, shared: Arc<Shared>) {
    shared.connections.fetch_add(1, Ordering::SeqCst);

    if let Err(e) = converse(&mut socket, axis, &options, &shared).await {
        debug!("mock {axis} connection ended: {e}");
    }

    shared.connections.fetch_sub(1, Ordering::SeqCst);
}

async fn converse(
    socket: &mut TcpStream,
    axis: AxisType,
    options: &MockOptions,
    shared: &Shared,
) -> io::Result<()> {
    let (reader, mut writer) = socket.split();

    if let Some(greeting) = &options.greeting {
        writer.write_all(greeting.as_bytes()).await?;
    }

    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        lock(&shared.received).push(line.clone());

        if options.behaviour == Behaviour::Silent {
            continue;
        }

        let reply = respond(axis, &line, &shared.position);

        if !options.reply_delay.is_zero() {
            time::sleep(options.reply_delay).await;
        }

        writer.write_all(reply.as_bytes()).await?;
    }

    Ok(())
}

fn respond(axis: AxisType, line: &str, position: &Mutex<f64>) -> String {
    const ACK: &str = "RPRT 0\n";
    const NACK: &str = "RPRT -1\n";

    let Some(body) = line.strip_prefix("w ") else {
        return NACK.to_string();
    };
    let prefix = axis.prefix().unwrap_or('?');

    match body {
        "S" => ACK.to_string(),
        "CAL" => {
            *lock(position) = 0.0;
            ACK.to_string()
        }
        _ => match body.strip_prefix(prefix) {
            Some("") => format!("{prefix}={:.2} {ACK}", *lock(position)),
            Some(value) => match value.parse::<f64>() {
                Ok(value) => {
                    *lock(position) = value;
                    ACK.to_string()
                }
                Err(_) => NACK.to_string(),
            },
            None => NACK.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_like_the_daemon() {
        let position = Mutex::new(0.0);

        assert_eq!(respond(AxisType::Azimuth, "w A12.50", &position), "RPRT 0\n");
        assert_eq!(respond(AxisType::Azimuth, "w A", &position), "A=12.50 RPRT 0\n");
        assert_eq!(respond(AxisType::Azimuth, "w E", &position), "RPRT -1\n");
        assert_eq!(respond(AxisType::Azimuth, "w CAL", &position), "RPRT 0\n");
        assert_eq!(respond(AxisType::Azimuth, "w A", &position), "A=0.00 RPRT 0\n");
        assert_eq!(respond(AxisType::Azimuth, "hello", &position), "RPRT -1\n");
    }
}
