use anyhow::Context;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::http::connection::{Connection, ConnectionState};
use crate::server::signal::Shutdown;
use crate::server::slots::ConnectionTable;
use crate::static_files::StaticFiles;

const LISTENER: Token = Token(0);
const SHUTDOWN: Token = Token(1);
/// Token of connection slot 0.
const FIRST_CONNECTION: usize = 2;

const EVENTS_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub id: usize,
    /// Connection slots owned by this worker.
    pub slots: usize,
    pub idle_timeout: Option<Duration>,
}

impl WorkerSettings {
    pub fn from_config(id: usize, cfg: &ServerConfig) -> Self {
        Self {
            id,
            slots: cfg.slots_per_worker(),
            idle_timeout: cfg.idle_timeout(),
        }
    }
}

/// Single-threaded event loop serving connections accepted from a shared
/// listening socket.
pub struct Worker {
    settings: WorkerSettings,
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionTable<TcpStream>,
    files: StaticFiles,
    shutdown: Shutdown,
}

impl Worker {
    /// Takes over an already listening socket. `listener` is switched to
    /// non-blocking mode.
    pub fn new(
        settings: WorkerSettings,
        listener: std::net::TcpListener,
        files: StaticFiles,
        mut shutdown: Shutdown,
    ) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        poll.registry()
            .register(shutdown.source(), SHUTDOWN, Interest::READABLE)?;

        Ok(Self {
            connections: ConnectionTable::new(settings.slots, settings.idle_timeout),
            settings,
            poll,
            listener,
            files,
            shutdown,
        })
    }

    /// Runs until shutdown is requested, then closes every open connection.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!(
            id = self.settings.id,
            slots = self.settings.slots,
            "Worker started"
        );

        while !self.shutdown.is_requested() {
            let timeout = self.poll_timeout();
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("readiness wait failed");
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    SHUTDOWN => self.shutdown.drain(),
                    token => self.dispatch(token),
                }
            }

            self.expire_idle();
        }

        info!(
            id = self.settings.id,
            open = self.connections.len(),
            "Worker stopping"
        );
        for idx in self.connections.indices() {
            self.close(idx);
        }
        Ok(())
    }

    /// How long the next wait may block: until the earliest connection
    /// deadline, or forever when nothing can expire.
    fn poll_timeout(&self) -> Option<Duration> {
        let deadline = self.connections.next_deadline()?;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    /// Accepts until the backlog is empty. Other workers race for the same
    /// connections, so an empty backlog is routine.
    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let idx = match self.connections.insert(Connection::new(stream)) {
            Ok(idx) => idx,
            Err(_rejected) => {
                warn!(%peer, "Too many clients, rejecting connection");
                return;
            }
        };

        let Some(conn) = self.connections.get_mut(idx) else {
            return;
        };
        let registered = self.poll.registry().register(
            conn.stream_mut(),
            Token(idx + FIRST_CONNECTION),
            Interest::READABLE | Interest::WRITABLE,
        );

        match registered {
            Ok(()) => info!(%peer, slot = idx, "Accepted connection"),
            Err(e) => {
                warn!(%peer, error = %e, "Cannot watch connection");
                self.connections.remove(idx);
            }
        }
    }

    /// Advances the connection behind `token` by the step its state calls
    /// for, then reclaims it if it finished.
    fn dispatch(&mut self, token: Token) {
        let Some(idx) = token.0.checked_sub(FIRST_CONNECTION) else {
            return;
        };
        let Some(conn) = self.connections.get_mut(idx) else {
            return;
        };

        let before = conn.state();
        match before {
            ConnectionState::Connected | ConnectionState::Reading => {
                conn.advance_read(&self.files)
            }
            ConnectionState::Sending => conn.advance_send(),
            ConnectionState::Draining => conn.advance_drain(),
            ConnectionState::Complete | ConnectionState::Error => {}
        }

        if conn.is_terminal() {
            self.close(idx);
        } else if conn.state() != before {
            self.connections.watch(idx);
        }
    }

    /// Times out every connection whose deadline has passed. One answered
    /// with 408 lingers before it is closed.
    fn expire_idle(&mut self) {
        for idx in self.connections.expired(Instant::now()) {
            let Some(conn) = self.connections.get_mut(idx) else {
                continue;
            };
            if conn.state() == ConnectionState::Draining {
                debug!(slot = idx, "Linger expired");
            } else {
                info!(slot = idx, state = ?conn.state(), "Connection idle, expiring");
            }
            conn.time_out();

            if conn.is_terminal() {
                self.close(idx);
            } else {
                self.connections.watch(idx);
            }
        }
    }

    /// Stops watching the connection in `idx`, frees the slot and closes the
    /// socket.
    fn close(&mut self, idx: usize) {
        let Some(mut conn) = self.connections.remove(idx) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
            debug!(slot = idx, error = %e, "Deregister failed");
        }
        match conn.last_error() {
            Some(e) => warn!(slot = idx, error = %e, "Connection closed with error"),
            None => debug!(slot = idx, "Connection closed"),
        }
    }
}
