//! Multi-client TCP telemetry server.
//!
//! Accepts any number of consumers and fans every telemetry payload out to
//! all of them. Capture speed never affects this server; the control loop
//! decides when to call [`TelemetryServer::broadcast`].
//!
//! # Threads
//!
//! ```text
//! telemetry-accept ──accept──▶ registry.insert(conn) ──spawn──▶ telemetry-client
//!                                                                     │
//!                                    registry.remove(conn) ◀── EOF / error
//! ```
//!
//! - **Accept loop**: polls a non-blocking listener, sleeping between polls,
//!   so a stop request is seen within one poll interval.
//! - **Client loop**: one thread per connection reading with a bounded
//!   timeout. Clients are not expected to send anything; the read only
//!   detects disconnects. Timeouts just re-loop.
//!
//! # Registry
//!
//! The connection registry is the single shared mutation point: the accept
//! thread inserts, client threads remove themselves, and the control loop
//! reads the count and iterates for broadcast. All access goes through one
//! mutex. The accept thread holds it while spawning a client thread, so a
//! client can never try to remove itself before it has been inserted.
//!
//! # Shutdown
//!
//! `stop()` clears the running flag, joins the accept thread, then shuts
//! down every registered socket and joins every client thread, including
//! clients already dropped by a failed broadcast. When it returns, no
//! server thread is left running and every socket is closed.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default bounded wait for accept/read loops
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-client write timeout during broadcast
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest sleep between two non-blocking accept polls
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Client read buffer size
const READ_BUFFER_SIZE: usize = 1024;

/// Server tuning
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Upper bound on how long accept/read loops block before rechecking
    /// the running flag
    pub poll_timeout: Duration,
    /// Bound on a single client write during broadcast
    pub write_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Running totals for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub broadcasts: u64,
    pub write_failures: u64,
}

/// A registered client: write half of the socket plus its serving thread
struct Connection {
    peer: SocketAddr,
    stream: TcpStream,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    connections: BTreeMap<u64, Connection>,
    /// Threads of removed connections, joined on stop
    retired: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl Registry {
    /// Join retired threads that have already returned
    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.retired = running;
        for handle in finished {
            if handle.join().is_err() {
                log::error!("Telemetry client thread panicked");
            }
        }
    }
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    broadcasts: AtomicU64,
    write_failures: AtomicU64,
}

/// TCP server that broadcasts telemetry to every connected client
pub struct TelemetryServer {
    local_addr: SocketAddr,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    accept_thread: Option<JoinHandle<()>>,
}

impl TelemetryServer {
    /// Bind and start accepting clients with default options
    ///
    /// Returns as soon as the listener is bound; accepting happens on a
    /// dedicated thread.
    pub fn start(bind_address: &str, port: u16) -> Result<Self> {
        Self::start_with_options(bind_address, port, ServerOptions::default())
    }

    /// Bind and start accepting clients
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for a zero timeout, [`Error::Bind`] if the
    /// address cannot be bound.
    pub fn start_with_options(bind_address: &str, port: u16, options: ServerOptions) -> Result<Self> {
        // Sockets reject a zero timeout, which would drop every client
        if options.poll_timeout.is_zero() || options.write_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "telemetry poll and write timeouts must be non-zero".into(),
            ));
        }
        let address = format!("{}:{}", bind_address, port);
        let listener = TcpListener::bind(&address).map_err(|source| Error::Bind {
            address: address.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::default()));
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let accept_registry = Arc::clone(&registry);
        let accept_running = Arc::clone(&running);
        let accept_counters = Arc::clone(&counters);
        let accept_thread = thread::Builder::new()
            .name("telemetry-accept".to_string())
            .spawn(move || {
                accept_loop(
                    listener,
                    accept_registry,
                    accept_running,
                    accept_counters,
                    options,
                );
            })?;

        log::info!("Telemetry server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            registry,
            running,
            counters,
            accept_thread: Some(accept_thread),
        })
    }

    /// Address actually bound (useful when port 0 was requested)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently registered clients
    pub fn connection_count(&self) -> usize {
        lock(&self.registry).connections.len()
    }

    /// Whether the server has not been stopped
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Write `payload` to every registered client
    ///
    /// A failed write only drops that client; the rest still receive the
    /// payload. Returns the number of clients the payload reached.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        let mut registry = lock(&self.registry);
        let mut failed = Vec::new();

        for (id, conn) in registry.connections.iter_mut() {
            if let Err(e) = conn.stream.write_all(payload) {
                log::debug!("Telemetry write to {} failed: {}", conn.peer, e);
                failed.push(*id);
            }
        }

        for id in &failed {
            if let Some(mut conn) = registry.connections.remove(id) {
                log::info!("Telemetry client dropped after write failure: {}", conn.peer);
                let _ = conn.stream.shutdown(Shutdown::Both);
                if let Some(handle) = conn.handle.take() {
                    registry.retired.push(handle);
                }
            }
        }

        let delivered = registry.connections.len();
        drop(registry);

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters
            .write_failures
            .fetch_add(failed.len() as u64, Ordering::Relaxed);
        log::trace!("Broadcast {} bytes to {} clients", payload.len(), delivered);
        delivered
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting, close every client and join all server threads
    ///
    /// Safe to call more than once and from any thread owning the server.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::info!("Telemetry server stopping");
        }

        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                log::error!("Telemetry accept thread panicked");
            }
        }

        // Take everything out first: client threads lock the registry on exit
        let (connections, retired) = {
            let mut registry = lock(&self.registry);
            (
                std::mem::take(&mut registry.connections),
                std::mem::take(&mut registry.retired),
            )
        };

        let mut handles = retired;
        for (_, mut conn) in connections {
            let _ = conn.stream.shutdown(Shutdown::Both);
            if let Some(handle) = conn.handle.take() {
                handles.push(handle);
            }
        }
        let closed = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Telemetry client thread panicked");
            }
        }

        if closed > 0 {
            log::info!("Telemetry server stopped ({} client threads joined)", closed);
        }
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept thread main loop
fn accept_loop(
    listener: TcpListener,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    options: ServerOptions,
) {
    let idle_sleep = ACCEPT_POLL_INTERVAL.min(options.poll_timeout);

    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !running.load(Ordering::Acquire) {
                    log::debug!("Closing connection from {} accepted during shutdown", peer);
                    let _ = stream.shutdown(Shutdown::Both);
                    continue;
                }
                if let Err(e) = register_client(stream, peer, &registry, &running, options) {
                    log::warn!("Failed to register telemetry client {}: {}", peer, e);
                    continue;
                }
                counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(idle_sleep);
            }
            Err(e) => {
                log::error!("Error accepting telemetry client: {}", e);
                thread::sleep(idle_sleep);
            }
        }
    }

    log::debug!("Telemetry accept loop exited");
}

/// Configure an accepted socket, register it and spawn its serving thread
fn register_client(
    stream: TcpStream,
    peer: SocketAddr,
    registry: &SharedRegistry,
    running: &Arc<AtomicBool>,
    options: ServerOptions,
) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(options.poll_timeout))?;
    stream.set_write_timeout(Some(options.write_timeout))?;
    let reader = stream.try_clone()?;

    let mut guard = lock(registry);
    guard.reap_finished();
    let id = guard.next_id;
    guard.next_id += 1;

    let client_registry = Arc::clone(registry);
    let client_running = Arc::clone(running);
    let handle = thread::Builder::new()
        .name(format!("telemetry-client-{}", id))
        .spawn(move || serve_client(id, peer, reader, client_registry, client_running))?;

    guard.connections.insert(
        id,
        Connection {
            peer,
            stream,
            handle: Some(handle),
        },
    );
    log::info!(
        "Telemetry client connected: {} ({} total)",
        peer,
        guard.connections.len()
    );
    Ok(())
}

/// Client thread: read until EOF or error, then deregister
fn serve_client(
    id: u64,
    peer: SocketAddr,
    mut stream: TcpStream,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    while running.load(Ordering::Acquire) {
        match stream.read(&mut buffer) {
            Ok(0) => {
                log::debug!("Telemetry client {} closed the connection", peer);
                break;
            }
            Ok(n) => {
                log::debug!("Ignoring {} bytes from telemetry client {}", n, peer);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                log::debug!("Telemetry client {} read error: {}", peer, e);
                break;
            }
        }
    }

    let remaining = {
        let mut guard = lock(&registry);
        // Our own handle goes to `retired` so stop() still joins this thread
        let removed = guard.connections.remove(&id);
        removed.map(|mut conn| {
            if let Some(handle) = conn.handle.take() {
                guard.retired.push(handle);
            }
            guard.connections.len()
        })
    };
    if let Some(remaining) = remaining {
        log::info!(
            "Telemetry client disconnected: {} ({} remaining)",
            peer,
            remaining
        );
    }
}
