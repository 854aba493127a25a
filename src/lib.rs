//! staticd - prefork static file server
//!
//! A fixed pool of worker processes shares one listening socket. Each worker
//! runs a single-threaded readiness loop and answers `GET`/`HEAD` requests
//! from a document root, one request per connection.

pub mod config;
pub mod http;
pub mod logging;
pub mod server;
pub mod static_files;
pub mod sys;
