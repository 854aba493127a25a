//! Process pool and per-process event loop.
//!
//! - **`listener`**: binds the socket, forks the workers and reaps them
//! - **`worker`**: one readiness loop per process, driving connections
//! - **`slots`**: the bounded connection table and its expiry deadlines
//! - **`signal`**: stop requests and signal wake-ups for blocked loops

pub mod listener;
pub mod signal;
pub mod slots;
pub mod worker;

pub use listener::{Listener, WorkerExit, reap_workers};
pub use signal::{Shutdown, ShutdownHandle};
pub use worker::{Worker, WorkerSettings};
