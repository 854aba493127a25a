use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Write};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes the status line, headers and blank line, followed by the body
/// unless `with_body` is false (HEAD).
pub fn serialize_response(resp: &Response, with_body: bool) -> Bytes {
    let body_len = if with_body { resp.body.len() } else { 0 };
    let mut buf = BytesMut::with_capacity(256 + body_len);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.put_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }

    // Header/body separator
    buf.put_slice(b"\r\n");

    if with_body {
        buf.put_slice(&resp.body);
    }

    buf.freeze()
}

/// Outcome of one [`WriteBuffer::write_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every byte has been handed to the socket.
    Done,
    /// The socket stopped accepting bytes; wait for it to become writable.
    Blocked,
}

/// Bytes queued for a connection plus a cursor over what has been sent.
///
/// `bytes_written() + size()` equals `total()` for the whole life of the
/// buffer.
#[derive(Debug)]
pub struct WriteBuffer {
    data: Bytes,
    written: usize,
}

impl WriteBuffer {
    pub fn new(data: Bytes) -> Self {
        Self { data, written: 0 }
    }

    pub fn from_response(response: &Response, with_body: bool) -> Self {
        Self::new(serialize_response(response, with_body))
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// Bytes not yet sent.
    pub fn size(&self) -> usize {
        self.data.len() - self.written
    }

    pub fn total(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn unsent(&self) -> &[u8] {
        &self.data[self.written..]
    }

    /// Writes as much as the sink accepts, stopping at completion or at the
    /// first `WouldBlock`. Any other error is returned with the cursor left
    /// after the last accepted byte.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> io::Result<Flush> {
        while self.written < self.data.len() {
            match sink.write(&self.data[self.written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Flush::Blocked),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Flush::Done)
    }
}
