use signal_hook::consts::SIGCHLD;
use staticd::config::ServerConfig;
use staticd::server::{Listener, Shutdown, reap_workers};
use staticd::sys::{ExitStatus, Pid};
use std::process::Command;
use std::time::{Duration, Instant};

fn server_config(listen_addr: &str) -> ServerConfig {
    ServerConfig {
        listen_addr: listen_addr.to_string(),
        ..ServerConfig::default()
    }
}

#[test]
fn test_listener_binds_ephemeral_port() {
    let listener = Listener::init(&server_config("127.0.0.1:0")).unwrap();
    let addr = listener.local_addr().unwrap();

    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);
    listener.shutdown();
}

#[test]
fn test_listener_rejects_port_in_use() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    assert!(Listener::init(&server_config(&addr.to_string())).is_err());
}

#[test]
fn test_listener_rejects_bad_address() {
    assert!(Listener::init(&server_config("localhost")).is_err());
    assert!(Listener::init(&server_config("127.0.0.1:99999")).is_err());
}

#[test]
fn test_port_is_free_after_shutdown() {
    let listener = Listener::init(&server_config("127.0.0.1:0")).unwrap();
    let addr = listener.local_addr().unwrap();
    listener.shutdown();

    let again = Listener::init(&server_config(&addr.to_string())).unwrap();
    again.shutdown();
}

fn spawn(program: &str, args: &[&str]) -> Pid {
    let child = Command::new(program).args(args).spawn().unwrap();
    child.id() as Pid
}

fn supervisor_signals() -> Shutdown {
    let mut signals = Shutdown::new().unwrap();
    signals.wake_on(SIGCHLD).unwrap();
    signals
}

#[test]
fn test_reap_collects_exit_codes() {
    let mut signals = supervisor_signals();
    let ok = spawn("true", &[]);
    let failed = spawn("sh", &["-c", "sleep 0.2; exit 3"]);

    let mut exits = reap_workers(&[ok, failed], &mut signals);
    exits.sort_by_key(|exit| exit.pid != ok);

    assert_eq!(exits.len(), 2);
    assert_eq!((exits[0].pid, exits[0].status), (ok, ExitStatus::Exited(0)));
    assert_eq!((exits[1].pid, exits[1].status), (failed, ExitStatus::Exited(3)));
}

#[test]
fn test_stop_requested_before_reaping_is_forwarded() {
    let mut signals = supervisor_signals();
    let pids = [spawn("sleep", &["30"]), spawn("sleep", &["30"])];

    // The request lands before the supervisor starts waiting.
    signals.handle().unwrap().trigger();
    let start = Instant::now();
    let exits = reap_workers(&pids, &mut signals);

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(exits.len(), 2);
    for exit in exits {
        assert_eq!(exit.status, ExitStatus::Signaled(libc::SIGTERM));
    }
}

#[test]
fn test_stop_requested_while_reaping_is_forwarded() {
    let mut signals = supervisor_signals();
    let handle = signals.handle().unwrap();
    let pid = spawn("sleep", &["30"]);

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        handle.trigger();
    });
    let start = Instant::now();
    let exits = reap_workers(&[pid], &mut signals);
    trigger.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(exits[0].status, ExitStatus::Signaled(libc::SIGTERM));
}
