//! HTTP protocol implementation.
//!
//! This module implements the small slice of HTTP/1.1 the server speaks:
//! one `GET` or `HEAD` per connection, answered and then closed.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-socket state machine driven by readiness events
//! - **`parser`**: Extracts the request line from the bytes received so far
//! - **`request`**: Request line and method representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes responses and tracks partially sent bytes
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │  Connected  │ ← Accepted, registered for read and write
//!        └──────┬──────┘
//!               │ First readable event
//!               ▼
//!        ┌─────────────┐
//!        │   Reading   │ ← Accumulate until the request line is complete
//!        └──────┬──────┘
//!               │ Line parsed, response built
//!               ▼
//!        ┌─────────────┐
//!        │   Sending   │ ← Resume from the cursor on every writable event
//!        └──────┬──────┘
//!               │ All bytes sent, sending half shut
//!               ▼
//!        ┌─────────────┐
//!        │  Draining   │ ← Discard input until the peer closes
//!        └──────┬──────┘
//!               │
//!               ├─ Peer closed / linger expired → Complete
//!               └─ I/O failure                  → Error
//! ```
//!
//! A peer that closes before sending anything goes straight to `Complete`.
//! `Complete` and `Error` are terminal: the owning worker closes the socket
//! and frees the slot as soon as it sees either.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
