//! UDP receive loop for GridLine telemetry.
//!
//! [`UdpTelemetryListener`] owns a bound socket and one background task that
//! receives datagrams and hands each `(buffer, sender)` pair to a registered
//! callback. The lifecycle is a small state machine:
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//! ```
//!
//! `start` is idempotent while running; `stop` is safe before `start` and
//! may be called repeatedly. Setup failures (unparsable address, port in
//! use) are surfaced as [`TelemetryError`]; once running, only an explicit
//! `stop` terminates the loop — receive errors are logged and survived.
//!
//! [`F1TelemetryFeed`] wires a listener to the F1 25 decoder and exposes the
//! decoded events as a bounded channel.

#![deny(static_mut_refs)]

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use gridline_telemetry_core::TelemetryError;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod feed;

pub use feed::F1TelemetryFeed;

/// Largest datagram the loop will receive; F1 25 packets stay well below.
pub const MAX_DATAGRAM_BYTES: usize = 2048;

/// Capacity of the decoded-event channel handed out by the feed.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2077;

const ENV_BIND: &str = "GRIDLINE_UDP_BIND";
const ENV_PORT: &str = "GRIDLINE_UDP_PORT";

// ── Configuration ────────────────────────────────────────────────────────────

/// Where and how the listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// IPv4 address to bind, as text.
    pub bind_address: String,
    /// UDP port to bind; zero is rejected.
    pub port: u16,
    /// Whether to accept broadcast datagrams.
    pub allow_broadcast: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            allow_broadcast: true,
        }
    }
}

impl ListenerConfig {
    /// Defaults overridden by `GRIDLINE_UDP_BIND` / `GRIDLINE_UDP_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var(ENV_BIND)
            && !bind.trim().is_empty()
        {
            config.bind_address = bind;
        }
        config.port = env_u16(ENV_PORT, config.port);
        config
    }

    /// Validate and resolve into a concrete socket address.
    pub fn socket_addr(&self) -> Result<SocketAddrV4, TelemetryError> {
        let ip: Ipv4Addr = self
            .bind_address
            .parse()
            .map_err(|_| TelemetryError::InvalidBindAddress(self.bind_address.clone()))?;
        if self.port == 0 {
            return Err(TelemetryError::InvalidPort(self.port));
        }
        Ok(SocketAddrV4::new(ip, self.port))
    }
}

fn env_u16(name: &str, fallback: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(fallback)
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// Receive-loop lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Cancellable UDP receive loop.
///
/// At most one background task is active per listener. The socket and the
/// shutdown signal are owned here and released deterministically by
/// [`stop`](Self::stop). Dropping the listener also ends the loop: the task
/// observes the closed shutdown channel and exits.
#[derive(Debug)]
pub struct UdpTelemetryListener {
    config: ListenerConfig,
    state: Arc<Mutex<ListenerState>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl UdpTelemetryListener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ListenerState::Stopped)),
            shutdown: None,
            task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        read_state(&self.state)
    }

    /// The configuration this listener binds with.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Bind the socket and start the receive loop.
    ///
    /// A no-op when already starting or running. On success every received
    /// datagram is passed to `on_packet` with its sender address, in arrival
    /// order, from a single background task.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the configured address does not parse,
    /// the port is invalid, or binding fails; the loop is not started.
    pub async fn start<F>(&mut self, on_packet: F) -> Result<(), TelemetryError>
    where
        F: FnMut(&[u8], SocketAddr) + Send + 'static,
    {
        match self.state() {
            ListenerState::Starting | ListenerState::Running => {
                debug!("listener already active; start is a no-op");
                return Ok(());
            }
            // A teardown in flight still owns the socket; finish it first.
            ListenerState::Stopping => self.stop().await,
            ListenerState::Stopped => {}
        }

        set_state(&self.state, ListenerState::Starting);
        let addr = match self.config.socket_addr() {
            Ok(addr) => SocketAddr::V4(addr),
            Err(err) => {
                set_state(&self.state, ListenerState::Stopped);
                return Err(err);
            }
        };
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(source) => {
                set_state(&self.state, ListenerState::Stopped);
                return Err(TelemetryError::Bind { addr, source });
            }
        };
        if self.config.allow_broadcast
            && let Err(source) = socket.set_broadcast(true)
        {
            set_state(&self.state, ListenerState::Stopped);
            return Err(TelemetryError::Bind { addr, source });
        }
        info!(%addr, broadcast = self.config.allow_broadcast, "UDP telemetry listener bound");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(receive_loop(socket, shutdown_rx, state, on_packet));

        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        set_state(&self.state, ListenerState::Running);
        Ok(())
    }

    /// Signal the loop to stop and wait for it to finish.
    ///
    /// Deterministic teardown: when this returns, the background task has
    /// exited and the socket is closed. Safe to call repeatedly, before
    /// `start`, and from a different context than `start`.
    pub async fn stop(&mut self) {
        let shutdown = self.shutdown.take();
        let task = self.task.take();
        if shutdown.is_none() && task.is_none() {
            set_state(&self.state, ListenerState::Stopped);
            return;
        }

        set_state(&self.state, ListenerState::Stopping);
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(error = %err, "listener task ended abnormally");
        }
        set_state(&self.state, ListenerState::Stopped);
    }
}

async fn receive_loop<F>(
    socket: UdpSocket,
    mut shutdown_rx: watch::Receiver<bool>,
    state: Arc<Mutex<ListenerState>>,
    mut on_packet: F,
) where
    F: FnMut(&[u8], SocketAddr) + Send + 'static,
{
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
    loop {
        tokio::select! {
            // Also fires when the listener is dropped without an explicit
            // stop: a closed channel ends the loop the same way.
            _ = shutdown_rx.changed() => {
                debug!("listener shutdown requested");
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => on_packet(&buf[..len], peer),
                Err(err) => warn!(error = %err, "transient UDP receive error"),
            }
        }
    }
    set_state(&state, ListenerState::Stopped);
}

fn read_state(state: &Mutex<ListenerState>) -> ListenerState {
    *state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn set_state(state: &Mutex<ListenerState>, next: ListenerState) {
    *state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = next;
}
