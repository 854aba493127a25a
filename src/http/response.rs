use bytes::Bytes;

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): File or directory listing served
/// - `BadRequest` (400): Malformed request line
/// - `Forbidden` (403): Path escapes the document root or is unreadable
/// - `NotFound` (404): Resource missing or not servable
/// - `MethodNotAllowed` (405): Anything but GET and HEAD
/// - `RequestTimeout` (408): No complete request line before the idle timeout
/// - `InternalServerError` (500): Unexpected failure reading a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Timeout
    RequestTimeout,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use staticd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use staticd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete HTTP response ready to be serialized into a write buffer.
///
/// Headers keep their insertion order so the wire format is stable.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// HTTP headers in the order they are written
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .content_length(body.len())
///     .content_type("text/css")
///     .body(body)
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Adds or replaces a header. Names compare case-insensitively.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&key))
        {
            Some(existing) => existing.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    pub fn content_length(self, len: usize) -> Self {
        self.header("Content-Length", len.to_string())
    }

    pub fn content_type(self, mime: &str) -> Self {
        self.header("Content-Type", mime)
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the final Response.
    ///
    /// Every connection is closed after one response, which the
    /// `Connection: close` header announces.
    pub fn build(self) -> Response {
        let builder = self.header("Connection", "close");
        Response {
            status: builder.status,
            headers: builder.headers,
            body: builder.body,
        }
    }
}

impl Response {
    /// A 200 response carrying a file's contents.
    pub fn file(contents: Bytes, content_type: &str) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .content_length(contents.len())
            .content_type(content_type)
            .body(contents)
            .build()
    }

    /// A 200 response carrying an HTML directory listing.
    ///
    /// Listings carry no `Content-Length`; the body ends when the connection
    /// closes.
    pub fn listing(html: String) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .content_type("text/html")
            .body(html)
            .build()
    }

    /// An error response: empty body, `Content-Length: 0`,
    /// `Content-Type: text/html`.
    pub fn error(status: StatusCode) -> Self {
        ResponseBuilder::new(status)
            .content_length(0)
            .content_type("text/html")
            .build()
    }

    /// Looks up a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}
