//! UDP command listener
//!
//! Passively receives 5-byte command frames (see [`crate::streaming::wire`])
//! and keeps [`SharedFlags`] current. Commands are fire-and-forget: nothing
//! is ever sent back to the commander.
//!
//! # Failure Handling
//!
//! | Input | Action |
//! |-------|--------|
//! | Valid frame, known command | Flag updated |
//! | Valid framing, unknown command byte | Logged (`warn`), dropped |
//! | Wrong length / sync / EOB / message id | Dropped silently (`debug`) |
//! | Socket error | Logged, loop continues |
//!
//! The receive uses a bounded read timeout so `stop()` is noticed within
//! one poll interval. The socket is owned by the receive thread and closed
//! when it exits; `stop()` joins that thread.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::state::SharedFlags;
use crate::streaming::wire::{FrameError, parse_command};

/// Default bounded wait for a datagram
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Receive buffer; anything longer than a frame is rejected anyway
const MAX_DATAGRAM_SIZE: usize = 1024;

/// Datagram counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub applied: u64,
    pub malformed: u64,
    pub unrecognized: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    applied: AtomicU64,
    malformed: AtomicU64,
    unrecognized: AtomicU64,
}

/// UDP listener that owns the writer side of [`SharedFlags`]
pub struct CommandListener {
    local_addr: SocketAddr,
    flags: SharedFlags,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    thread: Option<JoinHandle<()>>,
}

impl CommandListener {
    /// Bind and start receiving with the default poll timeout
    pub fn start(bind_address: &str, port: u16, flags: SharedFlags) -> Result<Self> {
        Self::start_with_timeout(bind_address, port, flags, DEFAULT_POLL_TIMEOUT)
    }

    /// Bind and start receiving
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for a zero timeout, [`Error::Bind`] if the
    /// address cannot be bound.
    pub fn start_with_timeout(
        bind_address: &str,
        port: u16,
        flags: SharedFlags,
        poll_timeout: Duration,
    ) -> Result<Self> {
        if poll_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "command poll timeout must be non-zero".into(),
            ));
        }
        let address = format!("{}:{}", bind_address, port);
        let socket = UdpSocket::bind(&address).map_err(|source| Error::Bind {
            address: address.clone(),
            source,
        })?;
        socket.set_read_timeout(Some(poll_timeout))?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let thread_flags = flags.clone();
        let thread_running = Arc::clone(&running);
        let thread_counters = Arc::clone(&counters);
        let thread = thread::Builder::new()
            .name("command-listener".to_string())
            .spawn(move || receive_loop(socket, thread_flags, thread_running, thread_counters))?;

        log::info!("Command listener bound to {}", local_addr);

        Ok(Self {
            local_addr,
            flags,
            running,
            counters,
            thread: Some(thread),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_stream_enabled(&self) -> bool {
        self.flags.is_stream_enabled()
    }

    pub fn is_display_enabled(&self) -> bool {
        self.flags.is_display_enabled()
    }

    /// Reader handle for other components
    pub fn flags(&self) -> SharedFlags {
        self.flags.clone()
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            received: self.counters.received.load(Ordering::Acquire),
            applied: self.counters.applied.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            unrecognized: self.counters.unrecognized.load(Ordering::Relaxed),
        }
    }

    /// Stop the receive loop and close the socket
    ///
    /// Blocks for at most one poll interval.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::info!("Command listener stopping");
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Command listener thread panicked");
            }
        }
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive thread main loop
fn receive_loop(
    socket: UdpSocket,
    flags: SharedFlags,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    while running.load(Ordering::Acquire) {
        let (len, src) = match socket.recv_from(&mut buffer) {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                log::error!("Command socket receive error: {}", e);
                continue;
            }
        };

        match parse_command(&buffer[..len]) {
            Ok(command) => {
                counters.applied.fetch_add(1, Ordering::Relaxed);
                let changed = flags.apply(command);
                log::info!(
                    "Command {:?} from {}{}",
                    command,
                    src,
                    if changed { "" } else { " (no change)" }
                );
            }
            Err(FrameError::UnknownCommand(id)) => {
                counters.unrecognized.fetch_add(1, Ordering::Relaxed);
                log::warn!("Received unrecognized command {:#04x} from {}", id, src);
            }
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                log::debug!("Dropping datagram from {}: {}", src, e);
            }
        }
        // Counted after handling so readers of `received` see the flag update
        counters.received.fetch_add(1, Ordering::Release);
    }

    log::info!("Command listener stopped");
    // Socket is dropped (closed) here
}
