use anyhow::Context;
use mio::{Events, Interest, Poll, Token};
use signal_hook::consts::SIGCHLD;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process;
use tracing::{error, info, info_span, warn};

use crate::config::ServerConfig;
use crate::server::signal::Shutdown;
use crate::server::worker::{Worker, WorkerSettings};
use crate::static_files::StaticFiles;
use crate::sys::{self, ExitStatus, Fork, Pid};

/// How one worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub pid: Pid,
    pub status: ExitStatus,
}

/// The bound server socket and the pool of worker processes sharing it.
pub struct Listener {
    socket: OwnedFd,
    server: ServerConfig,
}

impl Listener {
    /// Creates the socket and binds it. Listening starts in [`serve`].
    ///
    /// [`serve`]: Listener::serve
    pub fn init(cfg: &ServerConfig) -> anyhow::Result<Self> {
        let addr = cfg.socket_addr()?;
        let socket = sys::bind_socket(addr).with_context(|| format!("cannot bind {addr}"))?;
        info!(fd = socket.as_raw_fd(), %addr, "Server socket created");

        Ok(Self {
            socket,
            server: cfg.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::from(self.socket.try_clone()?).local_addr()
    }

    /// Starts listening, forks the workers and supervises them until every
    /// one has exited.
    ///
    /// SIGINT or SIGTERM received by this process is forwarded once to the
    /// workers still running; one that arrives while forking stops the
    /// forking. If a fork fails the workers already started are stopped and
    /// reaped before the error is returned.
    pub fn serve(&self, files: &StaticFiles) -> anyhow::Result<Vec<WorkerExit>> {
        sys::listen(self.socket.as_raw_fd(), self.server.max_connections)
            .context("cannot listen on server socket")?;
        info!(
            addr = %self.server.listen_addr,
            workers = self.server.workers,
            "Server listening"
        );

        let mut signals = Shutdown::new().context("cannot create signal channel")?;
        signals
            .install_signal_handlers()
            .and_then(|()| signals.wake_on(SIGCHLD))
            .context("cannot install signal handlers")?;

        let mut pids = Vec::with_capacity(self.server.workers);
        for id in 0..self.server.workers {
            if signals.is_requested() {
                info!(started = pids.len(), "Shutdown requested, not starting more workers");
                break;
            }
            match sys::fork() {
                Ok(Fork::Child) => process::exit(self.run_worker(id, files, &mut signals)),
                Ok(Fork::Parent(pid)) => {
                    info!(id, pid, "Worker forked");
                    pids.push(pid);
                }
                Err(e) => {
                    error!(id, error = %e, "Fork failed, stopping started workers");
                    signals.request();
                    reap_workers(&pids, &mut signals);
                    return Err(e).context("cannot fork worker");
                }
            }
        }

        Ok(reap_workers(&pids, &mut signals))
    }

    /// Closes the server socket.
    pub fn shutdown(self) {
        info!(fd = self.socket.as_raw_fd(), "Shutting down server");
    }

    fn run_worker(&self, id: usize, files: &StaticFiles, inherited: &mut Shutdown) -> i32 {
        let span = info_span!("worker", id, pid = process::id());
        let _enter = span.enter();

        match self.start_worker(id, files, inherited) {
            Ok(()) => 0,
            Err(e) => {
                error!(error = ?e, "Worker failed");
                1
            }
        }
    }

    /// Runs in the forked child. `inherited` is the supervisor's signal
    /// state as of the fork: a stop requested before this worker's own
    /// handlers were in place is carried over.
    fn start_worker(
        &self,
        id: usize,
        files: &StaticFiles,
        inherited: &mut Shutdown,
    ) -> anyhow::Result<()> {
        let mut shutdown = Shutdown::new().context("cannot create shutdown channel")?;
        shutdown
            .install_signal_handlers()
            .context("cannot install signal handlers")?;
        if inherited.is_requested() {
            shutdown.request();
        }
        inherited.release_signal_handlers();

        let listener = TcpListener::from(self.socket.try_clone()?);
        let settings = WorkerSettings::from_config(id, &self.server);
        let mut worker = Worker::new(settings, listener, files.clone(), shutdown)
            .context("cannot start event loop")?;
        worker.run()
    }
}

const WAKE: Token = Token(0);

/// Waits for every worker in `pids` to exit.
///
/// `signals` must wake on SIGCHLD. Each pass forwards a pending stop
/// request to the workers still running (once), collects the workers that
/// have exited, and only then sleeps until the next signal, so a signal
/// that lands between the checks and the wait still ends the wait.
pub fn reap_workers(pids: &[Pid], signals: &mut Shutdown) -> Vec<WorkerExit> {
    let mut running = pids.to_vec();
    let mut exits = Vec::with_capacity(pids.len());
    let mut forwarded = false;

    let mut poll = match Poll::new().and_then(|poll| {
        poll.registry()
            .register(signals.source(), WAKE, Interest::READABLE)?;
        Ok(poll)
    }) {
        Ok(poll) => poll,
        Err(e) => {
            error!(error = %e, "Cannot watch signals, waiting without them");
            return wait_blocking(running, exits);
        }
    };
    let mut events = Events::with_capacity(8);

    loop {
        if !forwarded && signals.is_requested() {
            info!(running = running.len(), "Shutdown signal received, stopping workers");
            for &pid in &running {
                let _ = sys::terminate(pid);
            }
            forwarded = true;
        }

        running.retain(|&pid| match sys::try_wait(pid) {
            Ok(Some(status)) => {
                exits.push(collected(pid, status));
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(pid, error = %e, "Cannot wait for worker");
                false
            }
        });
        if running.is_empty() {
            return exits;
        }

        match poll.poll(&mut events, None) {
            Ok(()) => signals.drain(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!(error = %e, "Signal wait failed, stopping workers");
                for &pid in &running {
                    let _ = sys::terminate(pid);
                }
                return wait_blocking(running, exits);
            }
        }
    }
}

fn wait_blocking(running: Vec<Pid>, mut exits: Vec<WorkerExit>) -> Vec<WorkerExit> {
    for pid in running {
        match sys::wait_for(pid) {
            Ok(status) => exits.push(collected(pid, status)),
            Err(e) => error!(pid, error = %e, "Cannot wait for worker"),
        }
    }
    exits
}

fn collected(pid: Pid, status: ExitStatus) -> WorkerExit {
    match status {
        ExitStatus::Exited(code) => info!(pid, code, "Worker exited"),
        ExitStatus::Signaled(signal) => warn!(pid, signal, "Worker killed by signal"),
    }
    WorkerExit { pid, status }
}
