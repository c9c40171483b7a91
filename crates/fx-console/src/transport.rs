//! UDP transport for OSC messages.
//!
//! An [`Endpoint`] is a bound socket. Sending is fire-and-forget; inbound
//! datagrams are decoded on a listener task and handed to the handler
//! registered for their path in a [`DispatchTable`].
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Undecodable datagrams are logged and dropped
//! - Handlers run on the listener task and must not block

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use fx_protocol::{OscMessage, OscUrl};
use rand::Rng;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

// ============================================================================
// Constants
// ============================================================================

/// Bind attempts before giving up.
pub const BIND_ATTEMPTS: usize = 5;

/// Offsets added to the preferred port by [`Endpoint::bind`].
pub const BIND_SPREAD: RangeInclusive<u16> = 1..=10_000;

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    /// Every bind attempt collided with a port in use.
    #[error("no free port found near {base} after {attempts} attempts")]
    PortExhausted { base: u16, attempts: usize },

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Endpoint
// ============================================================================

/// A bound UDP socket that sends and receives OSC messages.
#[derive(Debug, Clone)]
pub struct Endpoint {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
}

impl Endpoint {
    /// Binds at `preferred` plus a random offset in [`BIND_SPREAD`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PortExhausted`] after [`BIND_ATTEMPTS`]
    /// failed attempts.
    pub async fn bind(preferred: u16) -> Result<Self, TransportError> {
        Self::bind_near(preferred, BIND_SPREAD).await
    }

    /// Binds at `base` plus a random offset drawn from `spread`.
    ///
    /// Offsets that overflow the port range count as failed attempts.
    pub async fn bind_near(base: u16, spread: RangeInclusive<u16>) -> Result<Self, TransportError> {
        for attempt in 1..=BIND_ATTEMPTS {
            let offset = rand::thread_rng().gen_range(spread.clone());
            let Some(port) = base.checked_add(offset) else {
                debug!(base, offset, "Bind offset out of range");
                continue;
            };

            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(socket) => {
                    let local = socket.local_addr()?;
                    info!(port = local.port(), attempt, "Endpoint bound");
                    return Ok(Self {
                        socket: Arc::new(socket),
                        local,
                    });
                }
                Err(e) => {
                    debug!(port, attempt, error = %e, "Bind attempt failed");
                }
            }
        }

        Err(TransportError::PortExhausted {
            base,
            attempts: BIND_ATTEMPTS,
        })
    }

    /// Binds an OS-assigned port on the loopback interface.
    pub async fn bind_loopback() -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let local = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn port(&self) -> u16 {
        self.local.port()
    }

    /// URL other processes use to reach this endpoint.
    pub fn url(&self, host: &str) -> OscUrl {
        OscUrl::new(host, self.port())
    }

    /// Sends one message. No delivery confirmation, no retry.
    pub async fn send_to(&self, target: SocketAddr, message: &OscMessage) -> Result<(), TransportError> {
        trace!(%target, path = %message.path, "Sending message");
        self.socket.send_to(&message.encode(), target).await?;
        Ok(())
    }

    /// Spawns a task feeding inbound messages to `table` until cancelled.
    pub fn listen(&self, table: DispatchTable, cancel: CancellationToken) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let port = self.port();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            debug!(port, paths = table.len(), "Listener started");

            loop {
                let (len, from) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(port, error = %e, "Receive failed");
                            continue;
                        }
                    },
                };

                let Some(datagram) = buf.get(..len) else {
                    continue;
                };
                match OscMessage::decode(datagram) {
                    Ok(message) => {
                        if !table.dispatch(&message, from) {
                            debug!(port, path = %message.path, %from, "No handler for message");
                        }
                    }
                    Err(e) => {
                        warn!(port, %from, error = %e, "Dropping undecodable datagram");
                    }
                }
            }

            debug!(port, "Listener stopped");
        })
    }
}

/// Resolves an OSC URL to a socket address.
pub async fn resolve(url: &OscUrl) -> Result<SocketAddr, TransportError> {
    let authority = url.authority();
    let found = tokio::net::lookup_host(authority.as_str())
        .await?
        .find(SocketAddr::is_ipv4);
    found.ok_or(TransportError::Resolve(authority))
}

// ============================================================================
// Dispatch
// ============================================================================

/// Callback for one message path.
pub type Handler = Box<dyn Fn(&OscMessage, SocketAddr) + Send + Sync>;

/// Inbound handlers keyed by message path.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `path`, replacing any previous one.
    pub fn register<F>(&mut self, path: impl Into<String>, handler: F)
    where
        F: Fn(&OscMessage, SocketAddr) + Send + Sync + 'static,
    {
        self.handlers.insert(path.into(), Box::new(handler));
    }

    /// Runs the handler for `message`, returning false if there is none.
    pub fn dispatch(&self, message: &OscMessage, from: SocketAddr) -> bool {
        match self.handlers.get(&message.path) {
            Some(handler) => {
                handler(message, from);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Message Sink
// ============================================================================

/// Destination for outbound protocol messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: OscMessage) -> Result<(), TransportError>;
}

/// Sends to the session daemon from the console's endpoint, so the
/// daemon's replies come back to that endpoint.
#[derive(Debug, Clone)]
pub struct DaemonLink {
    endpoint: Endpoint,
    daemon: SocketAddr,
}

impl DaemonLink {
    pub fn new(endpoint: Endpoint, daemon: SocketAddr) -> Self {
        Self { endpoint, daemon }
    }

    pub fn daemon_addr(&self) -> SocketAddr {
        self.daemon
    }
}

#[async_trait]
impl MessageSink for DaemonLink {
    async fn send(&self, message: OscMessage) -> Result<(), TransportError> {
        self.endpoint.send_to(self.daemon, &message).await
    }
}
