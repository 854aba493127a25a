use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::http::mime::content_type_for;
use crate::http::parser::{ParseError, parse_request_line};
use crate::http::request::{Method, RequestLine};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{Flush, WriteBuffer};
use crate::static_files::{ReadError, Resource, StaticFiles};

/// Longest request line accepted, terminator included.
pub const MAX_REQUEST_LINE: usize = 8192;

/// Longest wait for the peer to close once the response is fully sent.
pub const LINGER_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 1024;

/// A byte stream whose sending half can be closed on its own.
pub trait Transport: Read + Write {
    fn shutdown_write(&self) -> io::Result<()>;
}

impl Transport for mio::net::TcpStream {
    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Transport for std::net::TcpStream {
    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, nothing read yet.
    Connected,
    /// Part of the request line has arrived.
    Reading,
    /// A response is queued and partially sent.
    Sending,
    /// Response sent and our sending half shut; discarding input until the
    /// peer closes.
    Draining,
    /// Finished, or the peer closed before asking for anything.
    Complete,
    /// Unrecoverable I/O failure; see [`Connection::last_error`].
    Error,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Complete | ConnectionState::Error)
    }
}

/// One client socket and the progress of its single request.
///
/// Neither entry point ever waits: each does as much as the socket allows
/// right now and returns. The owner calls [`advance_read`],
/// [`advance_send`] or [`advance_drain`] again, according to [`state`],
/// when the socket is ready.
///
/// [`advance_read`]: Connection::advance_read
/// [`advance_send`]: Connection::advance_send
/// [`advance_drain`]: Connection::advance_drain
/// [`state`]: Connection::state
pub struct Connection<S> {
    stream: S,
    state: ConnectionState,
    read_buf: BytesMut,
    write_buf: Option<WriteBuffer>,
    request: Option<RequestLine>,
    status: Option<StatusCode>,
    last_error: Option<io::Error>,
    last_activity: Instant,
    peer_closed: bool,
}

impl<S: Transport> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: ConnectionState::Connected,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: None,
            request: None,
            status: None,
            last_error: None,
            last_activity: Instant::now(),
            peer_closed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// The queued response, present only while `Sending`.
    pub fn write_buffer(&self) -> Option<&WriteBuffer> {
        self.write_buf.as_ref()
    }

    pub fn request(&self) -> Option<&RequestLine> {
        self.request.as_ref()
    }

    /// Status of the response queued or sent, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn last_error(&self) -> Option<&io::Error> {
        self.last_error.as_ref()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// When this connection expires without further progress. Draining
    /// connections always expire, after at most [`LINGER_TIMEOUT`].
    pub fn deadline(&self, idle_timeout: Option<Duration>) -> Option<Instant> {
        let limit = match self.state {
            ConnectionState::Draining => {
                Some(idle_timeout.map_or(LINGER_TIMEOUT, |t| t.min(LINGER_TIMEOUT)))
            }
            ConnectionState::Complete | ConnectionState::Error => None,
            _ => idle_timeout,
        }?;
        self.last_activity.checked_add(limit)
    }

    pub fn is_expired(&self, now: Instant, idle_timeout: Option<Duration>) -> bool {
        self.deadline(idle_timeout)
            .is_some_and(|deadline| now >= deadline)
    }

    /// Read phase: pull in what the socket has, and once the request line is
    /// complete build the response and start sending it.
    pub fn advance_read(&mut self, files: &StaticFiles) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Reading
        ) {
            return;
        }
        self.state = ConnectionState::Reading;

        let eof = match self.fill_read_buf() {
            Ok(eof) => eof,
            Err(e) => {
                debug!(error = %e, "Receive failed");
                self.fail(e);
                return;
            }
        };

        if eof && self.read_buf.is_empty() {
            // Peer closed without sending anything.
            self.state = ConnectionState::Complete;
            return;
        }

        let line = match parse_request_line(&self.read_buf, eof) {
            Ok(line) => line,
            Err(ParseError::Incomplete) if self.read_buf.len() < MAX_REQUEST_LINE => return,
            Err(_) => {
                self.read_buf = BytesMut::new();
                self.respond(Response::error(StatusCode::BadRequest), false);
                return;
            }
        };
        self.read_buf = BytesMut::new();

        let (response, with_body) = handle_request(&line, files);
        self.request = Some(line);
        self.respond(response, with_body);
    }

    /// Send phase: push queued bytes until done or the socket is full.
    /// Input arriving meanwhile (late headers, an oversized line) is
    /// discarded.
    pub fn advance_send(&mut self) {
        if self.state != ConnectionState::Sending {
            return;
        }
        self.discard_input();

        let Some(buf) = self.write_buf.as_mut() else {
            self.begin_drain();
            return;
        };

        let before = buf.bytes_written();
        let result = buf.write_to(&mut self.stream);
        let progressed = buf.bytes_written() > before;

        if progressed {
            self.touch();
        }

        match result {
            Ok(Flush::Done) => {
                self.write_buf = None;
                self.begin_drain();
            }
            Ok(Flush::Blocked) => {}
            Err(e) => {
                debug!(error = %e, "Send failed");
                self.fail(e);
            }
        }
    }

    /// Drain phase: read and drop input until the peer closes.
    pub fn advance_drain(&mut self) {
        if self.state != ConnectionState::Draining {
            return;
        }
        self.discard_input();
        if self.peer_closed {
            self.state = ConnectionState::Complete;
        }
    }

    /// Gives up on a connection that made no progress for too long. One still
    /// reading gets a best-effort 408 and starts draining; one still sending
    /// is dropped; one draining is simply finished.
    pub fn time_out(&mut self) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Reading => {
                self.respond(Response::error(StatusCode::RequestTimeout), false);
                if self.state == ConnectionState::Sending {
                    self.fail(io::ErrorKind::TimedOut.into());
                }
            }
            ConnectionState::Sending => self.fail(io::ErrorKind::TimedOut.into()),
            ConnectionState::Draining => self.state = ConnectionState::Complete,
            ConnectionState::Complete | ConnectionState::Error => {}
        }
    }

    /// Reads until the socket would block, the peer closes, or the line
    /// buffer is full. Returns whether the peer closed.
    fn fill_read_buf(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];

        while self.read_buf.len() < MAX_REQUEST_LINE {
            let want = READ_CHUNK.min(MAX_REQUEST_LINE - self.read_buf.len());
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(true);
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    self.touch();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(false)
    }

    /// Reads until the socket would block and drops what arrives. Discarded
    /// input does not count as progress. Read errors end the drain; the send
    /// path reports its own failures.
    fn discard_input(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];

        while !self.peer_closed {
            match self.stream.read(&mut chunk) {
                Ok(0) => self.peer_closed = true,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "Discarding input failed");
                    self.peer_closed = true;
                }
            }
        }
    }

    /// Shuts our sending half so the peer sees the end of the response, then
    /// waits for its close.
    fn begin_drain(&mut self) {
        if let Err(e) = self.stream.shutdown_write() {
            debug!(error = %e, "Shutdown of sending half failed");
            self.state = ConnectionState::Complete;
            return;
        }
        self.touch();
        self.state = ConnectionState::Draining;
        self.advance_drain();
    }

    fn respond(&mut self, response: Response, with_body: bool) {
        match &self.request {
            Some(req) => info!(
                method = %req.method,
                path = %req.path,
                status = response.status.as_u16(),
                "Response"
            ),
            None => info!(status = response.status.as_u16(), "Response"),
        }

        self.status = Some(response.status);
        self.write_buf = Some(WriteBuffer::from_response(&response, with_body));
        self.state = ConnectionState::Sending;
        self.advance_send();
    }

    fn fail(&mut self, error: io::Error) {
        self.write_buf = None;
        self.last_error = Some(error);
        self.state = ConnectionState::Error;
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Maps a request line onto a response. The flag says whether the body goes
/// on the wire (false for HEAD).
fn handle_request(line: &RequestLine, files: &StaticFiles) -> (Response, bool) {
    let method = match line.method() {
        Some(method) if method.is_served() => method,
        _ => return (Response::error(StatusCode::MethodNotAllowed), false),
    };
    let with_body = method == Method::GET;
    let path = line.resource_path();

    let resource = match files.locate(path) {
        Ok(resource) => resource,
        Err(e) => {
            debug!(error = %e, "Rejected path");
            return (Response::error(e.status()), false);
        }
    };

    match resource {
        Resource::Directory(dir) => {
            let mut url_path = path.to_string();
            if !url_path.ends_with('/') {
                url_path.push('/');
            }
            match files.list(&dir, &url_path) {
                Ok(html) => (Response::listing(html), with_body),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot list directory");
                    (Response::error(ReadError::from(e).status()), false)
                }
            }
        }
        Resource::File(file) => match files.read(&file) {
            Ok(contents) => (Response::file(contents, content_type_for(&file)), with_body),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Cannot read file");
                (Response::error(e.status()), false)
            }
        },
        Resource::Other(_) => (Response::error(StatusCode::NotFound), false),
    }
}
