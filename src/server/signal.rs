use mio::net::UnixStream as PollStream;
use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signals that stop the server.
pub const TERMINATION_SIGNALS: &[libc::c_int] = &[SIGINT, SIGTERM];

/// A process's stop request.
///
/// The flag is what the loops check; the socket pair wakes a blocked
/// readiness wait so the flag is seen without waiting for a timeout. Signal
/// hooks registered through this value are removed when it is dropped or
/// released.
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    receiver: PollStream,
    sender: UnixStream,
    hooks: Vec<SigId>,
}

impl Shutdown {
    pub fn new() -> io::Result<Self> {
        let (sender, receiver) = UnixStream::pair()?;
        sender.set_nonblocking(true)?;
        receiver.set_nonblocking(true)?;

        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            receiver: PollStream::from_std(receiver),
            sender,
            hooks: Vec::new(),
        })
    }

    /// Routes SIGINT and SIGTERM to this token.
    pub fn install_signal_handlers(&mut self) -> io::Result<()> {
        for &signal in TERMINATION_SIGNALS {
            let id = signal_hook::flag::register(signal, Arc::clone(&self.flag))?;
            self.hooks.push(id);
            self.wake_on(signal)?;
        }
        Ok(())
    }

    /// Wakes the receiver when `signal` arrives, without requesting a stop.
    pub fn wake_on(&mut self, signal: libc::c_int) -> io::Result<()> {
        let id = signal_hook::low_level::pipe::register(signal, self.sender.try_clone()?)?;
        self.hooks.push(id);
        Ok(())
    }

    /// Removes every signal hook this token registered. A forked worker
    /// calls this on the copy it inherited from the supervisor.
    pub fn release_signal_handlers(&mut self) {
        for id in self.hooks.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }

    /// A handle that can request the stop from another thread.
    pub fn handle(&self) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: Arc::clone(&self.flag),
            sender: self.sender.try_clone()?,
        })
    }

    /// Requests the stop as a signal would.
    pub fn request(&self) {
        request(&self.flag, &self.sender);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The wake-up end, to register with the poller.
    pub fn source(&mut self) -> &mut PollStream {
        &mut self.receiver
    }

    /// Empties the wake-up socket.
    pub fn drain(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.receiver.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.release_signal_handlers();
    }
}

#[derive(Debug)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    sender: UnixStream,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        request(&self.flag, &self.sender);
    }
}

fn request(flag: &AtomicBool, sender: &UnixStream) {
    flag.store(true, Ordering::SeqCst);
    // A full socket already holds a pending wake-up.
    let _ = (&*sender).write(&[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_hook::consts::SIGUSR1;

    #[test]
    fn trigger_sets_flag_and_wakes_receiver() {
        let mut shutdown = Shutdown::new().unwrap();
        let handle = shutdown.handle().unwrap();
        assert!(!shutdown.is_requested());

        handle.trigger();
        assert!(shutdown.is_requested());

        let mut buf = [0u8; 8];
        assert_eq!(shutdown.source().read(&mut buf).unwrap(), 1);
        shutdown.drain();
        let err = shutdown.source().read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn request_from_owner_wakes_receiver() {
        let mut shutdown = Shutdown::new().unwrap();
        shutdown.request();
        assert!(shutdown.is_requested());

        let mut buf = [0u8; 8];
        assert_eq!(shutdown.source().read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn wake_on_signal_leaves_flag_clear() {
        let mut shutdown = Shutdown::new().unwrap();
        shutdown.wake_on(SIGUSR1).unwrap();

        signal_hook::low_level::raise(SIGUSR1).unwrap();

        let mut buf = [0u8; 8];
        assert!(shutdown.source().read(&mut buf).unwrap() >= 1);
        assert!(!shutdown.is_requested());
    }

    #[test]
    fn released_hooks_no_longer_wake() {
        let mut shutdown = Shutdown::new().unwrap();
        shutdown.wake_on(SIGUSR1).unwrap();
        shutdown.release_signal_handlers();

        // Keep the signal from taking the default action.
        let guard = Shutdown::new().and_then(|mut other| {
            other.wake_on(SIGUSR1)?;
            Ok(other)
        });
        let _guard = guard.unwrap();
        signal_hook::low_level::raise(SIGUSR1).unwrap();

        let mut buf = [0u8; 8];
        let err = shutdown.source().read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
