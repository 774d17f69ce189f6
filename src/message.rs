//! HTTP request and response values as they are recorded on a tape

use bytes::Bytes;
use hyper::Uri;

/// An HTTP request, either recorded or incoming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method (e.g., "GET", "POST")
    pub method: String,
    /// Absolute request URI
    pub uri: String,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl Request {
    /// Create a request with no headers and an empty body
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Parsed form of `uri`, if it is a valid URI
    pub fn parsed_uri(&self) -> Option<Uri> {
        self.uri.parse().ok()
    }

    /// Lower-cased target host, without port
    pub fn host(&self) -> Option<String> {
        self.parsed_uri()
            .and_then(|uri| uri.host().map(str::to_ascii_lowercase))
    }

    /// Path component of the URI
    pub fn path(&self) -> Option<String> {
        self.parsed_uri().map(|uri| uri.path().to_string())
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<String> {
        self.parsed_uri()
            .and_then(|uri| uri.query().map(str::to_string))
    }
}

/// An HTTP response, either recorded or live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Create a response with no headers and an empty body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_components() {
        let request = Request::new("GET", "http://API.example.com:8080/users?id=7");

        assert_eq!(request.host().as_deref(), Some("api.example.com"));
        assert_eq!(request.path().as_deref(), Some("/users"));
        assert_eq!(request.query().as_deref(), Some("id=7"));
    }

    #[test]
    fn test_unparseable_uri() {
        let request = Request::new("GET", "not a uri");
        assert!(request.host().is_none());
        assert!(request.path().is_none());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = Request::new("GET", "http://example.com/")
            .with_header("Content-Type", "application/json");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_response_builder() {
        let response = Response::new(201)
            .with_header("Location", "/users/7")
            .with_body("created");

        assert_eq!(response.status, 201);
        assert_eq!(response.header("location"), Some("/users/7"));
        assert_eq!(&response.body[..], b"created");
    }
}
