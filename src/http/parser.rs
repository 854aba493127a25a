use crate::http::request::RequestLine;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not split into exactly method, path and protocol.
    InvalidRequest,
    /// The request line is not terminated yet.
    Incomplete,
}

/// Extracts the request line from the start of `buf`.
///
/// Only the first line matters; headers and anything after them are
/// ignored. When `eof` is set the peer will send nothing more, so an
/// unterminated line is parsed as it stands instead of reported as
/// [`ParseError::Incomplete`].
pub fn parse_request_line(buf: &[u8], eof: bool) -> Result<RequestLine, ParseError> {
    let line = match buf.iter().position(|&b| b == b'\n') {
        Some(end) => &buf[..end],
        None if eof => buf,
        None => return Err(ParseError::Incomplete),
    };

    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidRequest)?;
    let mut parts = line.split_whitespace();

    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() {
        return Err(ParseError::InvalidRequest);
    }

    Ok(RequestLine {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
    })
}
