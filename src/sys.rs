//! Thin wrappers over the libc calls std does not expose: splitting
//! `bind` from `listen`, `fork`/`waitpid`/`kill` for the worker pool and
//! `flock` for file reads.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

macro_rules! syscall {
    ($func_name: ident ( $($arg: expr),* $(,)* ) ) => {
        {
            #[allow(unused_unsafe)]
            let result = unsafe { libc::$func_name($($arg,)* ) };
            if result == -1 { Err(std::io::Error::last_os_error()) } else { Ok(result) }
        }
    }
}

/// Creates a TCP socket bound to `addr`, not yet listening.
pub fn bind_socket(addr: SocketAddr) -> io::Result<OwnedFd> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    let raw = syscall!(socket(domain, libc::SOCK_STREAM, 0))?;
    // Owned from here on so every error path closes it.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let enable: libc::c_int = 1;
    syscall!(setsockopt(
        fd.as_raw_fd(),
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &enable as *const libc::c_int as *const libc::c_void,
        mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))?;

    let (storage, len) = raw_socket_addr(&addr);
    syscall!(bind(
        fd.as_raw_fd(),
        &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
        len,
    ))?;

    Ok(fd)
}

pub fn listen(fd: RawFd, backlog: usize) -> io::Result<()> {
    let backlog = backlog.min(libc::c_int::MAX as usize) as libc::c_int;
    syscall!(listen(fd, backlog)).map(drop)
}

fn raw_socket_addr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_scope_id = v6.scope_id();
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

pub type Pid = libc::pid_t;

pub enum Fork {
    Parent(Pid),
    Child,
}

/// Forks the current process.
///
/// Only call this while the process is single-threaded.
pub fn fork() -> io::Result<Fork> {
    match syscall!(fork())? {
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

/// Blocks until `pid` exits.
pub fn wait_for(pid: Pid) -> io::Result<ExitStatus> {
    let mut status: libc::c_int = 0;
    loop {
        match syscall!(waitpid(pid, &mut status, 0)) {
            Ok(_) => return Ok(decode_status(status)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Collects `pid` if it has exited, without blocking.
pub fn try_wait(pid: Pid) -> io::Result<Option<ExitStatus>> {
    let mut status: libc::c_int = 0;
    match syscall!(waitpid(pid, &mut status, libc::WNOHANG))? {
        0 => Ok(None),
        _ => Ok(Some(decode_status(status))),
    }
}

#[allow(unused_unsafe)]
fn decode_status(status: libc::c_int) -> ExitStatus {
    unsafe {
        if libc::WIFEXITED(status) {
            ExitStatus::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            ExitStatus::Signaled(libc::WTERMSIG(status))
        } else {
            ExitStatus::Exited(status)
        }
    }
}

pub fn terminate(pid: Pid) -> io::Result<()> {
    syscall!(kill(pid, libc::SIGTERM)).map(drop)
}

/// Advisory `flock` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlockKind {
    Shared,
    Exclusive,
}

/// Holds an advisory lock on a file until dropped.
pub struct FlockGuard<'a, F: AsRawFd> {
    file: &'a F,
}

impl<'a, F: AsRawFd> FlockGuard<'a, F> {
    pub fn acquire(file: &'a F, kind: FlockKind) -> io::Result<Self> {
        let op = match kind {
            FlockKind::Shared => libc::LOCK_SH,
            FlockKind::Exclusive => libc::LOCK_EX,
        };
        loop {
            match syscall!(flock(file.as_raw_fd(), op)) {
                Ok(_) => return Ok(Self { file }),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<F: AsRawFd> Drop for FlockGuard<'_, F> {
    fn drop(&mut self) {
        let _ = syscall!(flock(self.file.as_raw_fd(), libc::LOCK_UN));
    }
}
