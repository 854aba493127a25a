use std::fmt;

/// HTTP request methods.
///
/// Only `GET` and `HEAD` are served. The rest are recognised so they can be
/// logged by name before being answered with 405 Method Not Allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, typically uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use staticd::http::request::Method;
    /// assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "HEAD" => Some(Method::HEAD),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }

    /// Whether the server answers this method with content.
    pub fn is_served(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first line of a request, split into its three tokens.
///
/// The method is kept as received; interpretation happens in the connection
/// so an unknown method can still be answered with 405.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Raw method token, e.g. `"GET"`
    pub method: String,
    /// Request target as sent by the client, e.g. `"/assets/app.js?v=2"`
    pub path: String,
    /// Protocol token, e.g. `"HTTP/1.1"`. Not validated.
    pub version: String,
}

impl RequestLine {
    pub fn method(&self) -> Option<Method> {
        Method::from_str(&self.method)
    }

    /// The request target without its query string or fragment.
    pub fn resource_path(&self) -> &str {
        let end = self
            .path
            .find(&['?', '#'][..])
            .unwrap_or(self.path.len());
        &self.path[..end]
    }
}
